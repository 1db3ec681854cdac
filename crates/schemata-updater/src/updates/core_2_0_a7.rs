//! Core 2.0-a7: tag and level columns for logger messages.

use async_trait::async_trait;
use schemata_core::Migration;

use super::{UpdateContext, Updates};
use crate::error::Result;

/// Adds `logger_message.tag` and `logger_message.level`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggerMessageLevels;

#[async_trait]
impl Updates for LoggerMessageLevels {
    fn version(&self) -> &str {
        "2.0-a7"
    }

    async fn migrations(&self, context: &UpdateContext<'_>) -> Result<Vec<Migration>> {
        let factory = context.factory();
        Ok(vec![
            factory.add_column(
                "logger_message",
                "tag",
                "VARCHAR(50) NULL",
                Some("idlogger_message"),
            ),
            factory.add_column("logger_message", "level", "TINYINT", Some("timestamp")),
        ])
    }
}
