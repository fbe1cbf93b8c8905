//! Application state shared with the HTTP/WS handlers.
//!
//! Handlers never touch session data directly: they hold a handle to the
//! stage actor, which is the only writer.

use tracing::{error, info, instrument};

use crate::config::Settings;
use crate::stage::{self, StageConfig, StageHandle};
use crate::util::resolve_location;

pub struct AppState {
    pub stage: StageHandle,
}

impl AppState {
    /// Resolve the bank location, start the stage and kick off the first load.
    #[instrument(level = "info", skip_all)]
    pub fn new(settings: &Settings) -> Self {
        let bank_url = match resolve_location(&settings.bank_url) {
            Ok(url) => {
                info!(target: "bank", %url, "Question bank location");
                Some(url)
            }
            Err(e) => {
                error!(target: "bank", location = %settings.bank_url, error = %e, "Invalid bank location; starting with an empty bank");
                None
            }
        };

        let stage = stage::spawn(StageConfig {
            bank_url,
            question_time: settings.question_time,
            tick_period: settings.tick_period(),
        });
        info!(
            target: "faceoff_stage",
            question_time = settings.question_time,
            tick_millis = settings.tick_millis,
            "Stage started"
        );

        Self { stage }
    }
}
