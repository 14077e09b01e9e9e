use std::sync::Arc;

use crate::config::Config;
use crate::dispatcher::{DispatchTrigger, Dispatcher};
use crate::store::{QueueStore, SettingsStore};

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub queue: Arc<dyn QueueStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub dispatcher: Dispatcher,
    pub trigger: DispatchTrigger,
}

impl AppState {
    pub fn new(config: Config, queue: Arc<dyn QueueStore>, settings: Arc<dyn SettingsStore>) -> Self {
        let dispatcher = Dispatcher::new(queue.clone(), settings.clone());
        Self {
            config,
            queue,
            settings,
            dispatcher,
            trigger: DispatchTrigger::new(),
        }
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }
}
