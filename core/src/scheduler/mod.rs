pub mod cron;
pub mod daemon;
pub mod model;
pub mod store;

pub use cron::CronSchedule as CronMatcher;
pub use daemon::SchedulerDaemon;
pub use model::{
    CronSchedule, DurationSpec, IntervalSchedule, JobAction, JobId, JobPolicy, JobSchedule,
    JobTimezone, MisfirePolicy, OverlapPolicy, ScheduledJob, SessionMessageAction,
};

pub use store::{JobStore, JobsFile};
