//! Per-plugin serial queues.
//!
//! Every loaded plugin owns one unbounded channel and one worker task that
//! drains it strictly in arrival order, one [`Job`] at a time.  Events,
//! commands, fired timers and notices for the same plugin share the queue,
//! so a plugin never runs concurrently with itself; different plugins run
//! concurrently with each other.
//!
//! The worker is also the failure boundary: a hook that errors, panics or
//! exceeds the handler timeout is logged with plugin and handler context,
//! reported as a desktop notification and, for commands, answered with an
//! `ERROR:` response.  The queue keeps draining either way.

use crate::command::Response;
use crate::plugin::{HandlerError, Plugin, PluginContext};
use crate::traits::CompositorEvent;
use futures_util::FutureExt;
use log::{debug, error, info};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Upper bound for a single hook invocation.
pub const TASK_TIMEOUT: Duration = Duration::from_secs(35);

/// One unit of work for a plugin.
#[derive(Debug)]
pub enum Job {
    Event(CompositorEvent),
    Command {
        name: String,
        args: Vec<String>,
        reply: oneshot::Sender<Response>,
    },
    Timer {
        key: String,
        generation: u64,
    },
    Notice(String),
    Reload {
        section: toml::Table,
        reply: oneshot::Sender<Vec<String>>,
    },
    Exit {
        reply: oneshot::Sender<()>,
    },
}

/// Sending side of a plugin's queue.
#[derive(Debug, Clone)]
pub struct Mailbox {
    tx: mpsc::UnboundedSender<Job>,
}

impl Mailbox {
    pub fn new(tx: mpsc::UnboundedSender<Job>) -> Self {
        Self { tx }
    }

    /// Enqueue `job`.  Returns `false` once the worker is gone.
    pub fn send(&self, job: Job) -> bool {
        self.tx.send(job).is_ok()
    }

    /// Enqueue a notice for [`Plugin::on_notice`].
    pub fn post(&self, notice: impl Into<String>) -> bool {
        self.send(Job::Notice(notice.into()))
    }
}

/// Run `fut` under `limit`, turning panics and timeouts into errors.
pub async fn guarded<T, F>(limit: Duration, fut: F) -> Result<T, HandlerError>
where
    F: Future<Output = Result<T, HandlerError>>,
{
    match tokio::time::timeout(limit, AssertUnwindSafe(fut).catch_unwind()).await {
        Err(_) => Err(HandlerError::Timeout(limit)),
        Ok(Err(panic)) => Err(HandlerError::Panicked(panic_message(panic.as_ref()))),
        Ok(Ok(result)) => result,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".into()
    }
}

/// Log and notify a failed hook.
async fn report(ctx: &PluginContext, handler: &str, err: &HandlerError) {
    error!("{}::{} failed: {}", ctx.name, handler, err);
    ctx.notify_error(&format!("{}::{}: {}", ctx.name, handler, err))
        .await;
}

/// Start the worker draining `rx` for `plugin`.
pub fn spawn_worker(
    plugin: Box<dyn Plugin>,
    ctx: PluginContext,
    rx: mpsc::UnboundedReceiver<Job>,
    timeout: Duration,
) -> JoinHandle<()> {
    tokio::spawn(run_worker(plugin, ctx, rx, timeout))
}

async fn run_worker(
    mut plugin: Box<dyn Plugin>,
    mut ctx: PluginContext,
    mut rx: mpsc::UnboundedReceiver<Job>,
    timeout: Duration,
) {
    if let Err(e) = guarded(timeout, plugin.init(&mut ctx)).await {
        report(&ctx, "init", &e).await;
    }

    while let Some(job) = rx.recv().await {
        match job {
            Job::Event(event) => {
                let handler = format!("event_{}", event.name);
                debug!("{}::{}({})", ctx.name, handler, event.payload);
                if let Err(e) = guarded(timeout, plugin.handle_event(&mut ctx, &event)).await {
                    report(&ctx, &handler, &e).await;
                }
            }
            Job::Command { name, args, reply } => {
                let handler = format!("run_{}", name);
                debug!("{}::{}({})", ctx.name, handler, args.join(" "));
                let response =
                    match guarded(timeout, plugin.run_command(&mut ctx, &name, &args)).await {
                        Ok(output) => Response::Ok(output),
                        Err(e) => {
                            report(&ctx, &handler, &e).await;
                            Response::Error(e.to_string())
                        }
                    };
                let _ = reply.send(response);
            }
            Job::Timer { key, generation } => {
                if !ctx.timers.claim(&key, generation) {
                    debug!("{}: dropping stale timer {}", ctx.name, key);
                    continue;
                }
                if let Err(e) = guarded(timeout, plugin.on_timer(&mut ctx, &key)).await {
                    report(&ctx, &format!("timer_{}", key), &e).await;
                }
            }
            Job::Notice(notice) => {
                if let Err(e) = guarded(timeout, plugin.on_notice(&mut ctx, &notice)).await {
                    report(&ctx, "notice", &e).await;
                }
            }
            Job::Reload { section, reply } => {
                let errors = match guarded(timeout, async {
                    Ok(plugin.on_reload(&mut ctx, &section).await)
                })
                .await
                {
                    Ok(errors) => errors,
                    Err(e) => vec![e.to_string()],
                };
                let _ = reply.send(errors);
            }
            Job::Exit { reply } => {
                if let Err(e) = guarded(timeout, plugin.exit(&mut ctx)).await {
                    error!("{}::exit failed: {}", ctx.name, e);
                }
                let _ = reply.send(());
                break;
            }
        }
    }

    ctx.timers.cancel_all();
    ctx.cancel.cancel();
    info!("{} stopped", ctx.name);
}

//  Tests
