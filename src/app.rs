// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Explicit dependency injection (§9): constructs and wires every
//! collaborator — Store, EventBus, Rendezvous, TaskRegistry, ExecutionEngine,
//! Orchestrator, NotificationScheduler, Watchdog, Housekeeper — behind one
//! `App` record, instead of global singletons or closures smuggled through
//! mutable statics. Tests build an `App` with an in-memory Store and a fake
//! `AgentDriver`; production builds one with a durable SQLite path and the
//! real (out-of-scope, externally supplied) driver.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::Config;
use crate::driver::AgentDriver;
use crate::error::Result;
use crate::event_bus::EventBus;
use crate::execution_engine::ExecutionEngine;
use crate::housekeeper::Housekeeper;
use crate::notification_scheduler::NotificationScheduler;
use crate::orchestrator::Orchestrator;
use crate::rendezvous::Rendezvous;
use crate::store::Store;
use crate::task_registry::TaskRegistry;
use crate::watchdog::Watchdog;

/// Every collaborator the control plane needs, wired together once at
/// startup. `Orchestrator` is the only façade transport handlers call into;
/// everything else is reached through it.
pub struct App {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub bus: Arc<EventBus>,
    pub rendezvous: Arc<Rendezvous>,
    pub tasks: Arc<TaskRegistry>,
    pub engine: Arc<ExecutionEngine>,
    pub notifications: Arc<NotificationScheduler>,
    pub orchestrator: Arc<Orchestrator>,
    pub watchdog: Arc<Watchdog>,
    pub housekeeper: Arc<Housekeeper>,
}

impl App {
    /// Build the whole wiring graph. `store` is handed in already opened
    /// (durable file or in-memory) so callers control its lifetime; `driver`
    /// is the external agent-process collaborator (§1, §6).
    pub fn new(config: Config, store: Store, driver: Arc<dyn AgentDriver>) -> Self {
        let config = Arc::new(config);
        let store = Arc::new(store);
        let bus = Arc::new(EventBus::new(Arc::clone(&store)));
        let rendezvous = Arc::new(Rendezvous::new());
        let tasks = Arc::new(TaskRegistry::new());
        let semaphore = Arc::new(Semaphore::new(config.max_agents));
        let notifications = Arc::new(NotificationScheduler::new());

        let engine = Arc::new(ExecutionEngine::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&rendezvous),
            Arc::clone(&tasks),
            semaphore,
            driver,
            Arc::clone(&config),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store),
            Arc::clone(&bus),
            Arc::clone(&rendezvous),
            Arc::clone(&tasks),
            Arc::clone(&engine),
            Arc::clone(&notifications),
        ));
        notifications.wire_target(orchestrator.clone() as Arc<dyn crate::notification_scheduler::NotificationTarget>);

        let watchdog = Arc::new(Watchdog::new(Arc::clone(&store), Arc::clone(&bus), Arc::clone(&orchestrator), Arc::clone(&config)));
        let housekeeper = Arc::new(Housekeeper::new(Arc::clone(&store), Arc::clone(&config)));

        Self { config, store, bus, rendezvous, tasks, engine, notifications, orchestrator, watchdog, housekeeper }
    }

    /// Open the durable store at `config.resolved_database_path()` and reset
    /// any thread left `pending` from a prior crashed process back to
    /// `active` (§5 shared-resource policy).
    pub fn open(config: Config, driver: Arc<dyn AgentDriver>) -> Result<Self> {
        let store = Store::open(&config.resolved_database_path())?;
        recover_pending_threads(&store)?;
        Ok(Self::new(config, store, driver))
    }

    /// Start the Watchdog and Housekeeper background loops. Returns their
    /// join handles so shutdown can await them after cancellation.
    pub fn spawn_background_loops(&self) -> BackgroundHandles {
        BackgroundHandles {
            watchdog: tokio::spawn({
                let watchdog = Arc::clone(&self.watchdog);
                async move { watchdog.run().await }
            }),
            housekeeper: tokio::spawn({
                let housekeeper = Arc::clone(&self.housekeeper);
                async move { housekeeper.run().await }
            }),
        }
    }

    /// Orderly shutdown (§5): stop the background loops, cancel every
    /// notification worker and registered task, and signal `shutdown` to
    /// every live subscriber.
    pub async fn shutdown(&self, handles: BackgroundHandles) {
        self.watchdog.stop();
        self.housekeeper.stop();
        self.notifications.cancel_all();
        self.tasks.cancel_all();
        if let Ok(threads) = self.store.list_threads(false) {
            for thread in threads {
                self.bus.close_thread(&thread.id);
            }
        }
        let _ = handles.watchdog.await;
        let _ = handles.housekeeper.await;
    }
}

pub struct BackgroundHandles {
    watchdog: tokio::task::JoinHandle<()>,
    housekeeper: tokio::task::JoinHandle<()>,
}

/// Any thread left `pending` from a prior crashed process never reached
/// `running`, so it is reset to `active` rather than left stuck (§5).
fn recover_pending_threads(store: &Store) -> Result<()> {
    use crate::model::ThreadStatus;
    for thread in store.list_threads(true)? {
        if thread.status == ThreadStatus::Pending {
            store.update_thread_status(&thread.id, ThreadStatus::Active)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;
