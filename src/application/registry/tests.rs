//! Registry behaviour: uniqueness, permissions, enable/disable, triggers

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::CommandRegistry;
use crate::application::errors::{BotError, CommandError, StorageError};
use crate::application::messaging::CommandContext;
use crate::domain::entities::{
    CommandEntry, Message, Module, ModuleKind, PermissionLevel, Trigger, TriggerMask, User,
};
use crate::domain::traits::{Bot, BotInfo, PermissionStore, PermissionTable};

#[derive(Default)]
struct RecordingBot {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Bot for RecordingBot {
    async fn start(&self) -> Result<(), BotError> {
        Ok(())
    }

    async fn send_message(&self, chat_id: &str, text: &str) -> Result<String, BotError> {
        self.sent.lock().push((chat_id.to_string(), text.to_string()));
        Ok("sent".to_string())
    }

    fn bot_info(&self) -> BotInfo {
        BotInfo {
            id: "bot".to_string(),
            name: "test".to_string(),
            username: "test_bot".to_string(),
        }
    }
}

struct CmdDef {
    name: &'static str,
    triggers: TriggerMask,
    level: PermissionLevel,
    args: usize,
}

fn cmd(name: &'static str) -> CmdDef {
    CmdDef {
        name,
        triggers: TriggerMask::PREFIXED,
        level: PermissionLevel::None,
        args: 0,
    }
}

struct TestModule {
    name: &'static str,
    kind: ModuleKind,
    commands: Vec<CmdDef>,
    hits: Arc<AtomicUsize>,
    shutdowns: Arc<AtomicUsize>,
}

impl TestModule {
    fn new(name: &'static str, commands: Vec<CmdDef>) -> Self {
        Self {
            name,
            kind: ModuleKind::External,
            commands,
            hits: Arc::new(AtomicUsize::new(0)),
            shutdowns: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn internal(mut self) -> Self {
        self.kind = ModuleKind::Internal;
        self
    }
}

impl Module for TestModule {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "test module"
    }

    fn kind(&self) -> ModuleKind {
        self.kind
    }

    fn install(&self, registry: &CommandRegistry) {
        for def in &self.commands {
            let hits = self.hits.clone();
            let entry = CommandEntry::new(def.name, move |ctx: CommandContext| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    ctx.reply("ok").await
                }
            })
            .with_description(self.name)
            .with_triggers(def.triggers)
            .with_permission(def.level)
            .with_args(def.args);
            registry.add_command(entry, self);
        }
    }

    fn shutdown(&self, _registry: &CommandRegistry) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

fn message(author: &str) -> Message {
    Message::new("chan", "").with_sender(User::new(author))
}

async fn run(
    registry: &CommandRegistry,
    bot: &Arc<RecordingBot>,
    text: &str,
    trigger: Trigger,
    author: &str,
) -> Result<Option<String>, CommandError> {
    registry
        .resolve_and_dispatch(text, trigger, message(author), bot.clone())
        .await
}

#[test]
fn test_last_registration_wins() {
    let registry = CommandRegistry::new();
    let first = TestModule::new("First", vec![cmd("hello")]);
    let second = TestModule::new("Second", vec![cmd("hello")]);

    registry.install_module(Arc::new(first));
    registry.install_module(Arc::new(second));

    let commands = registry.commands();
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0].description, "Second");
    assert_eq!(commands[0].module.as_deref(), Some("Second"));

    // The shadowed module no longer lists the name
    assert!(registry.module("First").unwrap().commands.is_empty());
    assert_eq!(registry.module("Second").unwrap().commands, vec!["hello"]);
}

#[test]
fn test_add_command_records_new_module_enabled() {
    let registry = CommandRegistry::new();
    let module = TestModule::new("Loose", vec![]);
    registry.add_command(CommandEntry::new("one", |_ctx: CommandContext| async { Ok(()) }), &module);
    registry.add_command(CommandEntry::new("two", |_ctx: CommandContext| async { Ok(()) }), &module);

    let info = registry.module("loose").unwrap();
    assert!(info.enabled);
    assert_eq!(info.commands, vec!["one", "two"]);
    assert_eq!(registry.command_count(), 2);
}

#[tokio::test]
async fn test_owner_runs_user_command() {
    let registry = CommandRegistry::new();
    let bot = Arc::new(RecordingBot::default());
    let mut def = cmd("uptime");
    def.level = PermissionLevel::User;
    let module = TestModule::new("Base", vec![def]);
    let hits = module.hits.clone();
    registry.install_module(Arc::new(module));
    registry.grant_permission("42", PermissionLevel::Owner).unwrap();

    let ran = run(&registry, &bot, "uptime", Trigger::PrefixedMessage, "42").await;

    assert_eq!(ran, Ok(Some("uptime".to_string())));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(bot.sent.lock().len(), 1);
}

#[tokio::test]
async fn test_unknown_actor_is_unauthorized() {
    let registry = CommandRegistry::new();
    let bot = Arc::new(RecordingBot::default());
    let mut def = cmd("selfdestruct");
    def.level = PermissionLevel::Owner;
    let module = TestModule::new("Base", vec![def]);
    let hits = module.hits.clone();
    registry.install_module(Arc::new(module));

    let err = run(&registry, &bot, "selfdestruct", Trigger::PrefixedMessage, "7")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        CommandError::Unauthorized {
            command: "selfdestruct".to_string(),
            required: PermissionLevel::Owner,
        }
    );
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(registry.permission_of("7"), PermissionLevel::None);
}

#[tokio::test]
async fn test_permission_is_monotonic() {
    let registry = CommandRegistry::new();
    let bot = Arc::new(RecordingBot::default());
    let mut low = cmd("low");
    low.level = PermissionLevel::Mod;
    let mut high = cmd("high");
    high.level = PermissionLevel::Admin;
    registry.install_module(Arc::new(TestModule::new("Levels", vec![low, high])));

    registry.grant_permission("a", PermissionLevel::Admin).unwrap();
    registry.grant_permission("m", PermissionLevel::Mod).unwrap();

    assert!(run(&registry, &bot, "low", Trigger::PrefixedMessage, "a").await.is_ok());
    assert!(run(&registry, &bot, "high", Trigger::PrefixedMessage, "a").await.is_ok());
    assert!(run(&registry, &bot, "low", Trigger::PrefixedMessage, "m").await.is_ok());
    assert!(matches!(
        run(&registry, &bot, "high", Trigger::PrefixedMessage, "m").await,
        Err(CommandError::Unauthorized { .. })
    ));
}

#[tokio::test]
async fn test_disabled_module_blocks_even_owner() {
    let registry = CommandRegistry::new();
    let bot = Arc::new(RecordingBot::default());
    let module = TestModule::new("Weather", vec![cmd("forecast")]);
    let hits = module.hits.clone();
    registry.install_module(Arc::new(module));
    registry.grant_permission("42", PermissionLevel::Owner).unwrap();

    registry.disable_module("weather").unwrap();
    assert_eq!(registry.module_enabled("WEATHER"), Ok(false));
    assert!(registry.command("forecast").is_some());

    let err = run(&registry, &bot, "forecast", Trigger::PrefixedMessage, "42")
        .await
        .unwrap_err();
    assert_eq!(err, CommandError::ModuleDisabled("Weather".to_string()));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    registry.enable_module("Weather").unwrap();
    let ran = run(&registry, &bot, "forecast", Trigger::PrefixedMessage, "42").await;
    assert_eq!(ran, Ok(Some("forecast".to_string())));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_enable_unknown_module() {
    let registry = CommandRegistry::new();
    assert_eq!(
        registry.enable_module("nope"),
        Err(CommandError::ModuleNotFound("nope".to_string()))
    );
    assert_eq!(
        registry.disable_module("nope"),
        Err(CommandError::ModuleNotFound("nope".to_string()))
    );
    assert!(registry.module_enabled("nope").is_err());
}

#[test]
fn test_internal_module_cannot_be_disabled() {
    let registry = CommandRegistry::new();
    registry.install_module(Arc::new(TestModule::new("Base", vec![cmd("uptime")]).internal()));

    assert_eq!(
        registry.disable_module("base"),
        Err(CommandError::ModuleLocked("Base".to_string()))
    );
    assert_eq!(registry.module_enabled("Base"), Ok(true));
}

#[tokio::test]
async fn test_triggers_are_isolated() {
    let registry = CommandRegistry::new();
    let bot = Arc::new(RecordingBot::default());
    let mut mention_only = cmd("wave");
    mention_only.triggers = TriggerMask::DIRECT_MENTION;
    let prefix_only = cmd("roll");
    let module = TestModule::new("Fun", vec![mention_only, prefix_only]);
    let hits = module.hits.clone();
    registry.install_module(Arc::new(module));

    assert_eq!(run(&registry, &bot, "wave", Trigger::PrefixedMessage, "1").await, Ok(None));
    assert_eq!(run(&registry, &bot, "roll", Trigger::DirectMention, "1").await, Ok(None));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    assert!(run(&registry, &bot, "wave", Trigger::DirectMention, "1").await.unwrap().is_some());
    assert!(run(&registry, &bot, "roll", Trigger::PrefixedMessage, "1").await.unwrap().is_some());
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unknown_command_is_ignored() {
    let registry = CommandRegistry::new();
    let bot = Arc::new(RecordingBot::default());
    assert_eq!(run(&registry, &bot, "whatever x", Trigger::PrefixedMessage, "1").await, Ok(None));
    assert_eq!(run(&registry, &bot, "", Trigger::PrefixedMessage, "1").await, Ok(None));
    assert!(bot.sent.lock().is_empty());
}

#[tokio::test]
async fn test_argument_count_is_advisory() {
    let registry = CommandRegistry::new();
    let bot = Arc::new(RecordingBot::default());
    let mut def = cmd("giveperm");
    def.args = 2;
    let module = TestModule::new("Base", vec![def]);
    let hits = module.hits.clone();
    registry.install_module(Arc::new(module));

    let ran = run(&registry, &bot, "giveperm admin", Trigger::PrefixedMessage, "1").await;
    assert_eq!(ran, Ok(Some("giveperm".to_string())));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failing_handler_leaves_registry_untouched() {
    let registry = CommandRegistry::new();
    let bot = Arc::new(RecordingBot::default());
    let module = TestModule::new("Broken", vec![]);
    registry.add_command(
        CommandEntry::new("fail", |_ctx: CommandContext| async {
            Err::<(), _>(CommandError::HandlerExecution("disk on fire".to_string()))
        }),
        &module,
    );
    registry.add_command(
        CommandEntry::new("panic", |ctx: CommandContext| async move {
            if ctx.args.is_empty() {
                panic!("handler exploded");
            }
            Ok(())
        }),
        &module,
    );
    registry.grant_permission("1", PermissionLevel::User).unwrap();

    let before = (registry.commands().len(), registry.modules(), registry.permissions());

    let err = run(&registry, &bot, "fail", Trigger::PrefixedMessage, "1").await.unwrap_err();
    assert_eq!(err, CommandError::HandlerExecution("disk on fire".to_string()));

    let err = run(&registry, &bot, "panic", Trigger::PrefixedMessage, "1").await.unwrap_err();
    assert!(matches!(err, CommandError::HandlerExecution(_)));

    let after = (registry.commands().len(), registry.modules(), registry.permissions());
    assert_eq!(before, after);
}

#[test]
fn test_uninstall_removes_only_that_module() {
    let registry = CommandRegistry::new();
    let weather = TestModule::new("Weather", vec![cmd("forecast"), cmd("radar")]);
    let shutdowns = weather.shutdowns.clone();
    registry.install_module(Arc::new(weather));
    registry.install_module(Arc::new(TestModule::new("Fun", vec![cmd("roll")])));

    assert_eq!(registry.uninstall_module("weather"), Ok(2));
    assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    assert!(registry.command("forecast").is_none());
    assert!(registry.command("roll").is_some());
    assert!(registry.module("Weather").is_none());
    assert_eq!(
        registry.uninstall_module("Weather"),
        Err(CommandError::ModuleNotFound("Weather".to_string()))
    );
}

#[test]
fn test_remove_single_command() {
    let registry = CommandRegistry::new();
    registry.install_module(Arc::new(TestModule::new("Fun", vec![cmd("roll"), cmd("flip")])));

    assert!(registry.remove_command("roll").is_some());
    assert!(registry.remove_command("roll").is_none());
    assert_eq!(registry.module("Fun").unwrap().commands, vec!["flip"]);
}

#[test]
fn test_reinstalling_same_name_leaves_no_orphans() {
    let registry = CommandRegistry::new();
    let first = TestModule::new("Plugin", vec![cmd("a"), cmd("b")]);
    let first_shutdowns = first.shutdowns.clone();
    registry.install_module(Arc::new(first));
    registry.install_module(Arc::new(TestModule::new("Plugin", vec![cmd("b"), cmd("c")])));

    let names: Vec<String> = registry.commands().into_iter().map(|c| c.name).collect();
    assert_eq!(names, vec!["b", "c"]);
    assert_eq!(registry.modules().len(), 1);
    assert_eq!(first_shutdowns.load(Ordering::SeqCst), 1);
}

#[test]
fn test_clear_keeps_permissions() {
    let registry = CommandRegistry::new();
    registry.install_module(Arc::new(TestModule::new("Fun", vec![cmd("roll")])));
    registry.grant_permission("42", PermissionLevel::Owner).unwrap();

    registry.clear_modules_and_commands();

    assert!(registry.commands().is_empty());
    assert!(registry.modules().is_empty());
    assert_eq!(registry.permission_of("42"), PermissionLevel::Owner);
}

#[test]
fn test_replace_with_swaps_whole_set() {
    let live = CommandRegistry::new();
    let old = TestModule::new("Old", vec![cmd("old")]);
    let old_shutdowns = old.shutdowns.clone();
    live.install_module(Arc::new(old));
    live.grant_permission("42", PermissionLevel::Admin).unwrap();

    let staging = CommandRegistry::new();
    staging.install_module(Arc::new(TestModule::new("New", vec![cmd("new")])));

    live.replace_with(&staging);

    assert!(live.command("old").is_none());
    assert!(live.command("new").is_some());
    assert_eq!(live.modules().len(), 1);
    assert_eq!(old_shutdowns.load(Ordering::SeqCst), 1);
    assert_eq!(live.permission_of("42"), PermissionLevel::Admin);
    assert!(staging.commands().is_empty());
}

#[test]
fn test_reinstall_is_behaviourally_identical() {
    let registry = CommandRegistry::new();
    let build = || {
        let mut mention = cmd("uptime");
        mention.triggers = TriggerMask::ALL;
        let mut owner = cmd("selfdestruct");
        owner.level = PermissionLevel::Owner;
        Arc::new(TestModule::new("Base", vec![mention, owner]).internal())
    };
    registry.install_module(build());
    registry.grant_permission("42", PermissionLevel::Owner).unwrap();

    let shape = |r: &CommandRegistry| {
        r.commands()
            .into_iter()
            .map(|c| (c.name, c.triggers, c.min_permission, c.module))
            .collect::<Vec<_>>()
    };
    let before = shape(&registry);

    registry.clear_modules_and_commands();
    registry.install_module(build());

    assert_eq!(before, shape(&registry));
    assert_eq!(registry.permission_of("42"), PermissionLevel::Owner);
}

#[test]
fn test_claim_owner_only_on_empty_table() {
    let registry = CommandRegistry::new();
    assert!(registry.claim_owner("42").unwrap());
    assert_eq!(registry.permission_of("42"), PermissionLevel::Owner);

    assert!(!registry.claim_owner("7").unwrap());
    assert_eq!(registry.permission_of("7"), PermissionLevel::None);
}

/// Store whose writes always fail
struct ReadOnlyStore;

impl PermissionStore for ReadOnlyStore {
    fn load(&self) -> Result<PermissionTable, StorageError> {
        Ok(PermissionTable::from([("42".to_string(), PermissionLevel::Owner)]))
    }

    fn save(&self, _table: &PermissionTable) -> Result<(), StorageError> {
        Err(StorageError::Serialization("read-only".to_string()))
    }
}

#[tokio::test]
async fn test_failed_grant_is_rolled_back() {
    let registry = CommandRegistry::with_store(Arc::new(ReadOnlyStore)).unwrap();
    let bot = Arc::new(RecordingBot::default());
    let mut def = cmd("selfdestruct");
    def.level = PermissionLevel::Owner;
    let module = TestModule::new("Base", vec![def]);
    let hits = module.hits.clone();
    registry.install_module(Arc::new(module));

    assert!(registry.grant_permission("7", PermissionLevel::Owner).is_err());
    assert_eq!(registry.permission_of("7"), PermissionLevel::None);
    assert!(matches!(
        run(&registry, &bot, "selfdestruct", Trigger::PrefixedMessage, "7").await,
        Err(CommandError::Unauthorized { .. })
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // An existing record keeps its old level
    assert!(registry.grant_permission("42", PermissionLevel::User).is_err());
    assert_eq!(registry.permission_of("42"), PermissionLevel::Owner);
    assert_eq!(registry.permissions().len(), 1);
}

#[test]
fn test_failed_owner_claim_is_rolled_back() {
    struct EmptyReadOnly;
    impl PermissionStore for EmptyReadOnly {
        fn load(&self) -> Result<PermissionTable, StorageError> {
            Ok(PermissionTable::new())
        }
        fn save(&self, _table: &PermissionTable) -> Result<(), StorageError> {
            Err(StorageError::Serialization("read-only".to_string()))
        }
    }

    let registry = CommandRegistry::with_store(Arc::new(EmptyReadOnly)).unwrap();
    assert!(registry.claim_owner("42").is_err());
    assert!(registry.permissions().is_empty());
}

/// Module whose `install` yields between commands, widening the window in
/// which another install could interleave
struct SlowModule {
    commands: [&'static str; 3],
    shutdowns: Arc<AtomicUsize>,
}

impl SlowModule {
    fn new(commands: [&'static str; 3]) -> Self {
        Self {
            commands,
            shutdowns: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Module for SlowModule {
    fn name(&self) -> &str {
        "Plugin"
    }

    fn install(&self, registry: &CommandRegistry) {
        for name in self.commands {
            registry.add_command(CommandEntry::new(name, |_ctx: CommandContext| async { Ok(()) }), self);
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    fn shutdown(&self, _registry: &CommandRegistry) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_concurrent_installs_of_same_name_do_not_merge() {
    let registry = CommandRegistry::new();
    let a = SlowModule::new(["a1", "a2", "a3"]);
    let b = SlowModule::new(["b1", "b2", "b3"]);
    let (a_down, b_down) = (a.shutdowns.clone(), b.shutdowns.clone());
    let (a, b): (Arc<dyn Module>, Arc<dyn Module>) = (Arc::new(a), Arc::new(b));

    std::thread::scope(|s| {
        s.spawn(|| registry.install_module(a.clone()));
        s.spawn(|| {
            std::thread::sleep(Duration::from_millis(5));
            registry.install_module(b.clone())
        });
    });

    let modules = registry.modules();
    assert_eq!(modules.len(), 1);
    let mut names: Vec<String> = registry.commands().into_iter().map(|c| c.name).collect();
    names.sort();
    let mut listed = modules[0].commands.clone();
    listed.sort();
    assert_eq!(names, listed);

    // Exactly one instance survives and the other was shut down
    let survivors = [names == ["a1", "a2", "a3"], names == ["b1", "b2", "b3"]];
    assert_eq!(survivors.iter().filter(|s| **s).count(), 1);
    assert_eq!(a_down.load(Ordering::SeqCst) + b_down.load(Ordering::SeqCst), 1);
}
