//! Page scripts evaluated through [`BrowserSession::run_script`].
//!
//! Each source is a function expression `(args, doc) => value` where `doc` is
//! the document of the current context (top-level or nested frame).
//!
//! [`BrowserSession::run_script`]: super::BrowserSession::run_script

use super::session::PageScript;

pub const PROBE_ELEMENT: PageScript = PageScript {
    name: "probe_element",
    source: r#"(args, doc) => {
    const el = doc.querySelector(args.selector);
    if (!el) return { found: false, visible: false, enabled: false, active: false };
    const view = doc.defaultView || window;
    const style = view.getComputedStyle(el);
    const rect = el.getBoundingClientRect();
    const visible = style.display !== 'none'
        && style.visibility !== 'hidden'
        && (rect.width > 0 || rect.height > 0 || el === doc.body);
    const enabled = !el.disabled
        && !el.readOnly
        && el.getAttribute('aria-disabled') !== 'true';
    const cls = typeof el.className === 'string' ? el.className : '';
    const active = el.getAttribute('aria-pressed') === 'true'
        || el.getAttribute('aria-selected') === 'true'
        || el.getAttribute('aria-checked') === 'true'
        || el.checked === true
        || /(^|\s)(active|selected|on|checked)(\s|$)/.test(cls);
    return { found: true, visible, enabled, active };
}"#,
};

pub const TEXT_CONTAINS: PageScript = PageScript {
    name: "text_contains",
    source: r#"(args, doc) => {
    const text = (doc.body && (doc.body.innerText || doc.body.textContent)) || '';
    const hit = args.needles.find(needle => needle && text.includes(needle));
    return hit === undefined ? null : hit;
}"#,
};

pub const STORAGE_SNAPSHOT: PageScript = PageScript {
    name: "storage_snapshot",
    source: r#"(args, doc) => {
    const storage = (doc.defaultView || window).localStorage;
    const out = [];
    for (let i = 0; i < storage.length; i += 1) {
        const key = storage.key(i);
        const value = storage.getItem(key);
        if (key !== null && value !== null) out.push([key, value]);
    }
    return out;
}"#,
};

pub const STORAGE_RESTORE: PageScript = PageScript {
    name: "storage_restore",
    source: r#"(args, doc) => {
    const storage = (doc.defaultView || window).localStorage;
    let applied = 0;
    for (const [key, value] of args.entries) {
        try { storage.setItem(key, value); applied += 1; } catch (_) {}
    }
    return applied;
}"#,
};

pub const CLICK_ELEMENT: PageScript = PageScript {
    name: "click_element",
    source: r#"(args, doc) => {
    const el = doc.querySelector(args.selector);
    if (!el) return false;
    el.click();
    return true;
}"#,
};

pub const TOOLBAR_STATE: PageScript = PageScript {
    name: "toolbar_state",
    source: r#"(args, doc) => {
    const buttons = Array.from(doc.querySelectorAll(args.selector));
    const disabled = buttons.filter(b => b.disabled
        || b.getAttribute('aria-disabled') === 'true'
        || /(^|\s)(disabled|mce-disabled)(\s|$)/.test(typeof b.className === 'string' ? b.className : ''));
    return { total: buttons.length, disabled: disabled.length };
}"#,
};

pub const RICH_EDITOR_API: PageScript = PageScript {
    name: "rich_editor_api",
    source: r#"(args, doc) => {
    const w = doc.defaultView || window;
    const top = window;
    const tiny = top.tinymce || w.tinymce;
    if (tiny && tiny.activeEditor && typeof tiny.activeEditor.setContent === 'function') {
        tiny.activeEditor.setContent(args.content);
        tiny.activeEditor.fire && tiny.activeEditor.fire('change');
        return { available: true, api: 'tinymce' };
    }
    const ck = top.CKEDITOR;
    if (ck && ck.instances) {
        const names = Object.keys(ck.instances);
        if (names.length > 0) {
            ck.instances[names[0]].setData(args.content);
            return { available: true, api: 'ckeditor' };
        }
    }
    const generic = top.editor;
    if (generic && typeof generic.setData === 'function') {
        generic.setData(args.content);
        return { available: true, api: 'editor.setData' };
    }
    return { available: false, api: null };
}"#,
};

pub const NESTED_DOCUMENT_WRITE: PageScript = PageScript {
    name: "nested_document_write",
    source: r#"(args, doc) => {
    const el = doc.querySelector(args.selector);
    if (!el) return { available: false };
    if (!(el.isContentEditable || el.tagName === 'BODY')) return { available: false };
    el.innerHTML = args.content;
    el.dispatchEvent(new Event('input', { bubbles: true }));
    return { available: true };
}"#,
};

pub const CODE_SURFACE_API: PageScript = PageScript {
    name: "code_surface_api",
    source: r#"(args, doc) => {
    const el = doc.querySelector(args.selector);
    const host = el && (el.CodeMirror ? el : (el.closest && el.closest('.CodeMirror')));
    if (host && host.CodeMirror) {
        host.CodeMirror.setValue(args.content);
        host.CodeMirror.save && host.CodeMirror.save();
        return { available: true, api: 'codemirror' };
    }
    const monaco = window.monaco;
    if (monaco && monaco.editor && monaco.editor.getModels().length > 0) {
        monaco.editor.getModels()[0].setValue(args.content);
        return { available: true, api: 'monaco' };
    }
    return { available: false, api: null };
}"#,
};

pub const VALUE_ASSIGNMENT: PageScript = PageScript {
    name: "value_assignment",
    source: r#"(args, doc) => {
    const el = doc.querySelector(args.selector);
    if (!el || !('value' in el)) return { available: false };
    const view = doc.defaultView || window;
    const proto = el.tagName === 'TEXTAREA'
        ? view.HTMLTextAreaElement.prototype
        : view.HTMLInputElement.prototype;
    const descriptor = Object.getOwnPropertyDescriptor(proto, 'value');
    if (descriptor && descriptor.set) {
        descriptor.set.call(el, args.content);
    } else {
        el.value = args.content;
    }
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return { available: true };
}"#,
};

pub const FOCUS_SURFACE: PageScript = PageScript {
    name: "focus_surface",
    source: r#"(args, doc) => {
    const el = doc.querySelector(args.selector);
    if (!el) return { focused: false };
    const host = el.CodeMirror ? el : (el.closest && el.closest('.CodeMirror'));
    if (host && host.CodeMirror) {
        if (args.clear) host.CodeMirror.setValue('');
        host.CodeMirror.focus();
        return { focused: true };
    }
    el.focus();
    if (args.clear) {
        if ('value' in el) {
            el.value = '';
            el.dispatchEvent(new Event('input', { bubbles: true }));
        } else {
            doc.execCommand('selectAll', false, null);
            doc.execCommand('delete', false, null);
        }
    }
    return { focused: doc.activeElement === el || el.contains(doc.activeElement) };
}"#,
};

pub const READ_SURFACE: PageScript = PageScript {
    name: "read_surface",
    source: r#"(args, doc) => {
    const el = doc.querySelector(args.selector);
    if (!el) return { found: false, length: 0, contains: false };
    let content = '';
    let text = '';
    const host = el.CodeMirror ? el : (el.closest && el.closest('.CodeMirror'));
    if (args.kind === 'markup' && host && host.CodeMirror) {
        content = host.CodeMirror.getValue();
        text = content;
    } else if ('value' in el && el.tagName !== 'BODY') {
        content = String(el.value || '');
        text = content;
    } else {
        content = el.innerHTML || '';
        text = el.innerText || el.textContent || '';
    }
    const probe = args.probe || '';
    const flat = text.replace(/<[^>]*>/g, ' ').replace(/\s+/g, ' ');
    return { found: true, length: content.length, contains: probe.length > 0 && flat.includes(probe) };
}"#,
};
