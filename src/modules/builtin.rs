//! Modules shipped with the gateway

use crate::error::HandlerError;
use crate::events::{kinds, CommandInvocation, GatewayEvent};
use crate::modules::{Module, ModuleContext, ModuleResult};
use crate::runtime::TaskId;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(3600);

/// `/uptime` command, shard-ready logging and a periodic uptime log line
#[derive(Default)]
pub struct UptimeModule {
    task: Mutex<Option<TaskId>>,
}

impl UptimeModule {
    pub const ENTRY: &'static str = "uptime";

    fn log_interval(ctx: &ModuleContext) -> Duration {
        ctx.settings()
            .get("log_interval_secs")
            .and_then(serde_json::Value::as_u64)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_LOG_INTERVAL)
    }
}

/// `1d 2h 3m 4s`, omitting leading zero units
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, hours, minutes, seconds) =
        (secs / 86_400, (secs % 86_400) / 3600, (secs % 3600) / 60, secs % 60);

    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[async_trait]
impl Module for UptimeModule {
    async fn enable(&self, ctx: &ModuleContext) -> ModuleResult {
        let booted_at = ctx.services().booted_at;

        ctx.register_command(
            "uptime",
            Arc::new(
                move |_: &CommandInvocation| -> Result<Option<String>, HandlerError> {
                    Ok(Some(format!("Up for {}", format_uptime(booted_at.elapsed()))))
                },
            ),
        );

        ctx.register_event(
            kinds::SHARD_READY,
            Arc::new(move |event: &GatewayEvent| -> Result<(), HandlerError> {
                info!(
                    shard_id = event.shard_id,
                    uptime = %format_uptime(booted_at.elapsed()),
                    "Shard ready"
                );
                Ok(())
            }),
        );

        let id = ctx.scheduler().schedule_repeating(
            "uptime-log",
            Self::log_interval(ctx),
            move || info!(uptime = %format_uptime(booted_at.elapsed()), "Gateway uptime"),
        )?;
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(id);

        Ok(())
    }

    async fn disable(&self, ctx: &ModuleContext) -> ModuleResult {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(id) = task {
            ctx.scheduler().cancel(id);
        }
        Ok(())
    }
}
