//! Process creation
//!
//! Spawning runs four steps: read the program, parse it, build its address
//! space and start a thread for it. Each resource a step produces is an
//! owning value, so a failure at any step releases exactly what the
//! completed steps allocated:
//!
//! | failing step | released on the error path |
//! |---|---|
//! | read | nothing |
//! | parse | image buffer |
//! | build | image buffer (the builder frees its own partial work) |
//! | thread start | the unattached context |

use crate::audit::{LifecycleEvent, SpawnStage};
use crate::binder::{ContextBinder, RefDrop};
use crate::config::{Priority, SpawnConfig};
use crate::context::ProcessContext;
use core_types::{ContextId, ThreadId};
use hal::MemoryError;
use kernel_api::{AddressSpaceBuilder, ExecutableParser, ProgramStore, SpawnError};
use std::sync::Arc;

/// Starts kernel threads that run user contexts
///
/// Implemented by the scheduler.
pub trait ThreadStarter {
    /// Creates and enqueues a thread bound to `context`
    ///
    /// On success the thread has attached `context` (count 1). On failure
    /// the context must be left unattached.
    fn start_user_thread(
        &self,
        context: Arc<ProcessContext>,
        priority: Priority,
        interruptible: bool,
    ) -> Result<ThreadId, MemoryError>;
}

/// Creates user processes from programs in storage
pub struct ProcessSpawner<'a> {
    store: &'a dyn ProgramStore,
    parser: &'a dyn ExecutableParser,
    builder: &'a dyn AddressSpaceBuilder,
    starter: &'a dyn ThreadStarter,
    binder: &'a ContextBinder,
    config: SpawnConfig,
}

impl<'a> ProcessSpawner<'a> {
    pub fn new(
        store: &'a dyn ProgramStore,
        parser: &'a dyn ExecutableParser,
        builder: &'a dyn AddressSpaceBuilder,
        starter: &'a dyn ThreadStarter,
        binder: &'a ContextBinder,
    ) -> Self {
        Self {
            store,
            parser,
            builder,
            starter,
            binder,
            config: SpawnConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SpawnConfig) -> Self {
        self.config = config;
        self
    }

    /// Spawns the program at `path` with `command_line`
    ///
    /// On success the new context has exactly two owners: the started
    /// thread and the returned handle.
    pub fn spawn(&self, path: &str, command_line: &str) -> Result<ProcessHandle, SpawnError> {
        let image = self
            .store
            .read_fully(path)
            .map_err(|err| self.fail(path, SpawnStage::Read, err.into()))?;

        let plan = self
            .parser
            .parse(&image)
            .map_err(|err| self.fail(path, SpawnStage::Parse, err.into()))?;

        let built = self.builder.build(&image, &plan, command_line);
        drop(image);
        let memory = built.map_err(|err| self.fail(path, SpawnStage::Build, err.into()))?;

        let context = Arc::new(ProcessContext::new(memory));
        self.binder.audit().record(LifecycleEvent::ContextCreated {
            context: context.id(),
            space: context.address_space_id(),
            frames: context
                .with_memory(self.binder.interrupts(), |m| m.frame_count())
                .unwrap_or(0),
        });

        let thread = match self.starter.start_user_thread(
            Arc::clone(&context),
            self.config.priority,
            self.config.interruptible,
        ) {
            Ok(thread) => thread,
            Err(err) => {
                log::warn!("thread start for {} failed: {}", path, err);
                self.binder.destroy_unattached(context);
                return Err(self.fail(path, SpawnStage::StartThread, SpawnError::OutOfMemory));
            }
        };

        let handle = ProcessHandle::new(thread, context, self.binder.clone());
        debug_assert_eq!(handle.ref_count(), 2);

        log::debug!("spawned {} as {} ({})", path, thread, handle.context_id());
        self.binder.audit().record(LifecycleEvent::SpawnSucceeded {
            path: path.to_string(),
            thread,
            context: handle.context_id(),
        });
        Ok(handle)
    }

    fn fail(&self, path: &str, stage: SpawnStage, err: SpawnError) -> SpawnError {
        log::warn!("spawn of {} failed at {:?}: {}", path, stage, err);
        self.binder.audit().record(LifecycleEvent::SpawnFailed {
            path: path.to_string(),
            stage,
            kind: err.kind(),
        });
        err
    }
}

/// The spawner's caller's reference to a new process
///
/// Holds one reference to the context. Dropping the handle releases it;
/// if the thread has already exited, that tears the context down.
pub struct ProcessHandle {
    thread: ThreadId,
    context: Arc<ProcessContext>,
    binder: ContextBinder,
    held: bool,
}

impl ProcessHandle {
    fn new(thread: ThreadId, context: Arc<ProcessContext>, binder: ContextBinder) -> Self {
        binder.acquire(&context);
        Self {
            thread,
            context,
            binder,
            held: true,
        }
    }

    /// Thread running the process
    pub fn thread_id(&self) -> ThreadId {
        self.thread
    }

    pub fn context_id(&self) -> ContextId {
        self.context.id()
    }

    /// The process context
    pub fn context(&self) -> &Arc<ProcessContext> {
        &self.context
    }

    /// Current owner count of the context
    pub fn ref_count(&self) -> usize {
        self.context.ref_count()
    }

    /// Exit status, once the thread has exited
    pub fn exit_status(&self) -> Option<i32> {
        self.context.exit_status()
    }

    /// Releases the handle's reference now
    pub fn release(mut self) -> RefDrop {
        self.held = false;
        self.binder.release(&self.context)
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("thread", &self.thread)
            .field("context", &self.context.id())
            .field("held", &self.held)
            .finish()
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if self.held {
            self.held = false;
            self.binder.release(&self.context);
        }
    }
}
