mod error;
mod publish;
mod report;

pub use error::{ErrorKind, WorkflowError, WorkflowResult};
pub use publish::{PublishOptions, PublishWorkflow};
pub use report::{PublishReport, StepRecord, StepStatus, WorkflowStep};
