//! Sliding-window admission control: state, policy, and decisions.

mod clock;
mod gate;
mod key;
mod policy;
mod store;
mod window;

pub use clock::{Clock, ManualClock, SystemClock};
pub use gate::{AdmissionGate, AdmissionRequest, Verdict};
pub use key::SubjectKey;
pub use policy::{AdmissionRules, RuleConfig, WindowRule};
pub use store::RateLimiterStore;
pub use window::{Admission, WindowCounter};
