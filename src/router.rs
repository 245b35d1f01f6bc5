use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::update::{self, ParsedCommand, RawUpdate, COMMAND_MARKER};

/// Something that reacts to a command: receives the chat id and the
/// command's arguments.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, chat_id: i64, args: Vec<String>) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> CommandHandler for F
where
    F: Fn(i64, Vec<String>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, chat_id: i64, args: Vec<String>) -> anyhow::Result<()> {
        (self)(chat_id, args).await
    }
}

/// Maps command names to the handlers registered for them.
///
/// Registration happens before ingestion starts; during ingestion the
/// router is only read.
#[derive(Clone, Default)]
pub struct CommandRouter {
    handlers: HashMap<String, Vec<Arc<dyn CommandHandler>>>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for `command`. Earlier handlers for the same name are
    /// kept and run first.
    pub fn register<H>(&mut self, command: &str, handler: H)
    where
        H: CommandHandler + 'static,
    {
        let name = command.strip_prefix(COMMAND_MARKER).unwrap_or(command);
        debug!("Registered handler for '/{}'", name);
        self.handlers
            .entry(name.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Closure flavour of [`register`](Self::register)
    pub fn on<F, Fut>(&mut self, command: &str, handler: F)
    where
        F: Fn(i64, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(command, handler);
    }

    pub fn handler_count(&self, command: &str) -> usize {
        self.handlers.get(command).map_or(0, Vec::len)
    }

    pub fn commands(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Run every handler registered for the command, in registration order.
    ///
    /// A handler that fails or panics is logged and the remaining handlers
    /// still run. Returns how many handlers completed successfully.
    pub async fn dispatch(&self, command: &ParsedCommand) -> usize {
        let Some(handlers) = self.handlers.get(&command.name) else {
            debug!("No handler for '/{}', ignoring", command.name);
            return 0;
        };

        let mut succeeded = 0;
        for (index, handler) in handlers.iter().enumerate() {
            let outcome = AssertUnwindSafe(handler.handle(command.chat_id, command.args.clone()))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(e)) => error!(
                    "Handler #{} for '/{}' failed in chat {}: {:#}",
                    index, command.name, command.chat_id, e
                ),
                Err(_) => error!(
                    "Handler #{} for '/{}' panicked in chat {}",
                    index, command.name, command.chat_id
                ),
            }
        }
        succeeded
    }

    /// Parse one raw update and dispatch it if it is a command.
    ///
    /// Malformed updates are logged and dropped here so the caller keeps
    /// ingesting.
    pub async fn route<'a>(&self, raw: impl Into<RawUpdate<'a>>) -> usize {
        match update::parse(raw) {
            Ok(Some(command)) => {
                debug!(
                    "Command '/{}' with {} argument(s) from chat {}",
                    command.name,
                    command.args.len(),
                    command.chat_id
                );
                self.dispatch(&command).await
            }
            Ok(None) => 0,
            Err(e) => {
                warn!("Skipping malformed update: {}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::text_update;
    use serde_json::json;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn recorder(router: &mut CommandRouter, command: &str, label: &'static str, log: &Log) {
        let log = log.clone();
        router.on(command, move |chat_id, args| {
            let log = log.clone();
            async move {
                log.lock()
                    .unwrap()
                    .push(format!("{label}:{chat_id}:{}", args.join(",")));
                anyhow::Ok(())
            }
        });
    }

    fn command(name: &str, args: &[&str]) -> ParsedCommand {
        ParsedCommand {
            name: name.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            chat_id: 42,
        }
    }

    struct Failing;

    #[async_trait]
    impl CommandHandler for Failing {
        async fn handle(&self, _chat_id: i64, _args: Vec<String>) -> anyhow::Result<()> {
            anyhow::bail!("handler exploded")
        }
    }

    #[tokio::test]
    async fn test_all_handlers_run_in_registration_order() {
        let log = Log::default();
        let mut router = CommandRouter::new();
        recorder(&mut router, "test", "first", &log);
        recorder(&mut router, "test", "second", &log);

        let ran = router.dispatch(&command("test", &["a", "b"])).await;

        assert_eq!(ran, 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:42:a,b".to_string(), "second:42:a,b".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failing_handler_does_not_stop_siblings() {
        let log = Log::default();
        let mut router = CommandRouter::new();
        router.register("test", Failing);
        recorder(&mut router, "test", "after", &log);

        let ran = router.dispatch(&command("test", &[])).await;

        assert_eq!(ran, 1);
        assert_eq!(*log.lock().unwrap(), vec!["after:42:".to_string()]);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let log = Log::default();
        let mut router = CommandRouter::new();
        router.on("test", |_chat_id, _args| async move {
            if true {
                panic!("handler panicked");
            }
            anyhow::Ok(())
        });
        recorder(&mut router, "test", "after", &log);

        let ran = router.dispatch(&command("test", &[])).await;

        assert_eq!(ran, 1);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unregistered_command_is_noop() {
        let log = Log::default();
        let mut router = CommandRouter::new();
        recorder(&mut router, "test", "only", &log);

        assert_eq!(router.dispatch(&command("other", &[])).await, 0);
        assert_eq!(router.dispatch(&command("Test", &[])).await, 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_register_strips_marker() {
        let mut router = CommandRouter::new();
        router.on("/start", |_, _| async { anyhow::Ok(()) });
        router.on("start", |_, _| async { anyhow::Ok(()) });

        assert_eq!(router.handler_count("start"), 2);
        assert_eq!(router.commands().collect::<Vec<_>>(), vec!["start"]);
    }

    #[tokio::test]
    async fn test_route_parses_then_dispatches() {
        let log = Log::default();
        let mut router = CommandRouter::new();
        recorder(&mut router, "greet", "greet", &log);

        assert_eq!(router.route(&text_update(1, 7, "/greet alice bob")).await, 1);
        assert_eq!(router.route(&text_update(2, 7, "greet alice")).await, 0);

        let malformed = json!({"update_id": 3, "message": {"text": "/greet x"}});
        assert_eq!(router.route(&malformed).await, 0);
        assert_eq!(router.route(&b"{oops"[..]).await, 0);

        assert_eq!(*log.lock().unwrap(), vec!["greet:7:alice,bob".to_string()]);
    }
}
