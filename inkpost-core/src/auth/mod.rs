mod artifact;
mod oracle;
mod store;
mod tiers;

pub use artifact::{normalize_expiry, DomainScope, OriginKind, SessionArtifact};
pub use oracle::{
    LoginState, LoginStateOracle, LoginVerdict, SignalVote, SIGNAL_CLIENT_STATE,
    SIGNAL_DOM_MARKERS, SIGNAL_LOCATION, SIGNAL_SIGN_OUT_TEXT,
};
pub use store::SessionStore;
pub use tiers::{AuthOutcome, AuthTier, Authenticator, Credentials, TierAttempt, TierStatus};
