pub mod event;
pub mod queue_record;
pub mod settings;

pub use event::{AttemptGradedEvent, AttemptSnapshot, QuizSnapshot};
pub use queue_record::{NewQueueRecord, QueueCounts, QueueRecord, RecordUpdate};
pub use settings::{DeliveryConfig, Settings, SettingsPatch};
