mod automation;
mod error;
mod profile;
pub mod scripts;
mod session;

pub use automation::{BrowserAutomation, BrowserLauncher, ChromiumSession, LaunchOverrides};
pub use error::{BrowserError, BrowserResult};
pub use profile::{BrowserProfile, ProfileManager};
pub use session::{
    fill_field, find_text, probe_element, restore_storage, storage_snapshot, wait_for_any,
    BrowserCookie, BrowserSession, DocumentContext, ElementProbe, PageScript,
};
