pub mod ledger;
pub mod maintenance;
pub mod model;
pub mod notify;
pub mod repo;
pub mod sender;
pub mod tick;

pub use ledger::{NotificationLedger, PgNotificationLedger};
pub use maintenance::CleanupSweep;
pub use model::{
    ExpirationPolicy, Finished, JobFilter, JobRecord, JobType, NotificationKey, NotificationRecord,
};
pub use notify::{FailureMessage, FailureNotifySweep};
pub use repo::{JobStore, PgJobStore};
pub use sender::{DeliveryError, NotificationSender, SendGridSender};
pub use tick::{Sweep, SweepSummary, TickLoop};
