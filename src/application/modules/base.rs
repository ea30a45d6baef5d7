//! Built-in owner commands that cannot be disabled

use std::future::Future;
use std::sync::Arc;

use chrono::Duration;

use crate::application::errors::CommandError;
use crate::application::messaging::CommandContext;
use crate::application::registry::CommandRegistry;
use crate::application::services::{ModuleService, WeakModuleService};
use crate::domain::entities::{
    CommandEntry, HandlerResult, Module, ModuleKind, PermissionLevel, Trigger, TriggerMask,
};

/// The base command set: uptime, reload, permissions and module management.
///
/// Handlers reach the live registry through the service rather than the
/// registry passed to `install`, which during a reload is the staging one.
pub struct BaseModule {
    service: WeakModuleService,
}

impl BaseModule {
    pub const NAME: &'static str = "Base";

    pub fn new(service: WeakModuleService) -> Self {
        Self { service }
    }

    /// Factory for [`ModuleServiceBuilder::internal_module`](crate::application::services::ModuleServiceBuilder::internal_module).
    pub fn factory(service: &ModuleService) -> Arc<dyn Module> {
        Arc::new(Self::new(service.downgrade()))
    }

    fn entry<F, Fut>(&self, name: &str, run: F) -> CommandEntry
    where
        F: Fn(ModuleService, CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        let service = self.service.clone();
        CommandEntry::new(name, move |ctx: CommandContext| {
            let running = service.upgrade().map(|svc| run(svc, ctx));
            async move {
                match running {
                    Ok(fut) => fut.await,
                    Err(e) => Err(e),
                }
            }
        })
    }
}

impl Module for BaseModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "The base set of commands that cannot be enabled or disabled by the user."
    }

    fn kind(&self) -> ModuleKind {
        ModuleKind::Internal
    }

    fn install(&self, registry: &CommandRegistry) {
        let both = TriggerMask::DIRECT_MENTION | TriggerMask::PREFIXED;

        registry.add_command(
            self.entry("uptime", uptime)
                .with_description("Check how long the bot has been running for.")
                .with_help("No arguments")
                .with_triggers(both),
            self,
        );
        registry.add_command(
            self.entry("selfdestruct", selfdestruct)
                .with_description("Shuts the bot down.")
                .with_permission(PermissionLevel::Owner),
            self,
        );
        registry.add_command(
            self.entry("reloadmodules", reload_modules)
                .with_description("Reloads the bot's modules.")
                .with_help("No arguments")
                .with_permission(PermissionLevel::Admin)
                .with_triggers(both),
            self,
        );
        registry.add_command(
            self.entry("removemodules", remove_modules)
                .with_description("Drops every plugin module, keeping the built-in ones.")
                .with_help("No arguments")
                .with_permission(PermissionLevel::Owner),
            self,
        );
        registry.add_command(
            self.entry("giveperm", give_permission)
                .with_description("Gives a permission level to a user.")
                .with_help("giveperm <owner|admin|mod|user|none> <user>")
                .with_permission(PermissionLevel::Owner)
                .with_args(2),
            self,
        );
        registry.add_command(
            self.entry("enablemodule", enable_module)
                .with_description("Enables a module by name.")
                .with_help("The module name is case insensitive.")
                .with_permission(PermissionLevel::Owner)
                .with_args(1),
            self,
        );
        registry.add_command(
            self.entry("disablemodule", disable_module)
                .with_description("Disables a module by name.")
                .with_help("The module name is case insensitive.")
                .with_permission(PermissionLevel::Owner)
                .with_args(1),
            self,
        );
        registry.add_command(
            self.entry("modules", list_modules)
                .with_description("Lists all the modules and whether or not they're enabled.")
                .with_permission(PermissionLevel::Owner),
            self,
        );
        registry.add_command(
            self.entry("moduleinfo", module_info)
                .with_description("Shows information about a specific module.")
                .with_permission(PermissionLevel::Owner)
                .with_args(1),
            self,
        );
        registry.add_command(
            self.entry("commands", list_commands)
                .with_description("Lists all of the available commands.")
                .with_permission(PermissionLevel::Owner),
            self,
        );
        registry.add_command(
            self.entry("cmdinfo", command_info)
                .with_description("Displays help for a command.")
                .with_help("cmdinfo <command>")
                .with_permission(PermissionLevel::Owner)
                .with_args(1),
            self,
        );
        registry.add_command(
            self.entry("changeprefix", change_prefix)
                .with_description("Changes the command prefix.")
                .with_help("changeprefix <prefix>")
                .with_permission(PermissionLevel::Owner)
                .with_args(1),
            self,
        );
        registry.add_command(
            self.entry("os", os_info)
                .with_description("Displays OS info for the bot.")
                .with_help("OS information"),
            self,
        );
    }
}

fn format_uptime(uptime: Duration) -> String {
    format!(
        "{} days, {} hrs, and {} mins",
        uptime.num_days(),
        uptime.num_hours() % 24,
        uptime.num_minutes() % 60
    )
}

/// Strip mention syntax (`<@123>`, `<@!123>`, `@name`) from an actor reference.
fn actor_id(reference: &str) -> &str {
    reference.trim_matches(|c| matches!(c, '<' | '@' | '!' | '>'))
}

async fn uptime(svc: ModuleService, ctx: CommandContext) -> HandlerResult {
    ctx.reply(format!("I've been running for `{}`~", format_uptime(svc.uptime())))
        .await
}

async fn selfdestruct(svc: ModuleService, ctx: CommandContext) -> HandlerResult {
    ctx.reply("Shutting down. Bye~").await?;
    svc.shutdown();
    Ok(())
}

async fn reload_modules(svc: ModuleService, ctx: CommandContext) -> HandlerResult {
    let mention = ctx
        .author()
        .map(|u| u.mention())
        .unwrap_or_else(|| "there".to_string());
    ctx.reply(format!("Okay {}~. Just give me one second!", mention))
        .await?;
    ctx.typing().await;

    let loaded = svc.reload(true).await?;
    ctx.reply(format!("I'm back! I reloaded {} module(s) for you!", loaded))
        .await
}

async fn remove_modules(svc: ModuleService, ctx: CommandContext) -> HandlerResult {
    ctx.reply("Working on it....").await?;
    ctx.typing().await;
    svc.reload(false).await?;
    ctx.reply("Done~").await
}

async fn give_permission(svc: ModuleService, ctx: CommandContext) -> HandlerResult {
    let (Some(level), Some(target)) = (ctx.arg(0), ctx.arg(1)) else {
        return Err(CommandError::InvalidArgs(
            "usage: giveperm <level> <user>".to_string(),
        ));
    };

    let level = PermissionLevel::from_name_lossy(level);
    let id = actor_id(target);
    if id.is_empty() {
        return Err(CommandError::InvalidArgs(format!("`{}` is not a user", target)));
    }

    svc.registry()
        .grant_permission(id, level)
        .map_err(|e| CommandError::HandlerExecution(e.to_string()))?;
    ctx.reply(format!("Given permission {} to <@{}>!", level, id))
        .await
}

async fn enable_module(svc: ModuleService, ctx: CommandContext) -> HandlerResult {
    let Some(name) = ctx.arg(0) else {
        return ctx.reply("What module?").await;
    };

    let registry = svc.registry();
    let reply = match registry.module_enabled(name) {
        Ok(true) => "Module already enabled!".to_string(),
        Ok(false) => match registry.enable_module(name) {
            Ok(()) => format!("Enabled {}.", name),
            Err(e) => format!("Couldn't enable module! {}", e),
        },
        Err(e) => format!("Couldn't enable module! {}", e),
    };
    ctx.reply(reply).await
}

async fn disable_module(svc: ModuleService, ctx: CommandContext) -> HandlerResult {
    let Some(name) = ctx.arg(0) else {
        return ctx.reply("What module?").await;
    };

    let registry = svc.registry();
    let reply = match registry.module_enabled(name) {
        Ok(false) => "Module already disabled!".to_string(),
        Ok(true) => match registry.disable_module(name) {
            Ok(()) => format!("Disabled {}.", name),
            Err(e) => format!("Couldn't disable module! {}", e),
        },
        Err(e) => format!("Couldn't disable module! {}", e),
    };
    ctx.reply(reply).await
}

async fn list_modules(svc: ModuleService, ctx: CommandContext) -> HandlerResult {
    let mut msg = String::from("**Modules**");
    for module in svc.registry().modules() {
        msg.push_str(&format!(
            "\n`{}` - {}",
            module.name,
            if module.enabled { "Enabled" } else { "Disabled" }
        ));
        if module.kind == ModuleKind::External {
            msg.push_str(" - From plugin");
        }
    }
    ctx.reply(msg).await
}

async fn module_info(svc: ModuleService, ctx: CommandContext) -> HandlerResult {
    let Some(name) = ctx.arg(0) else {
        return ctx.reply("What module?").await;
    };

    let info = svc
        .registry()
        .module(name)
        .ok_or_else(|| CommandError::ModuleNotFound(name.to_string()))?;

    let mut commands = info.commands.clone();
    commands.sort();
    let msg = format!(
        "**About Module {}**\n{}\nKind: {}\nEnabled: {}\nCommands ({} Total): {}",
        info.name,
        info.description,
        info.kind,
        info.enabled,
        commands.len(),
        commands.join(", ")
    );
    ctx.reply(msg).await
}

async fn list_commands(svc: ModuleService, ctx: CommandContext) -> HandlerResult {
    let names: Vec<String> = svc
        .registry()
        .commands()
        .into_iter()
        .map(|c| c.name)
        .collect();
    ctx.reply(format!("**Commands**\n```\n{}\n```", names.join(", ")))
        .await
}

async fn command_info(svc: ModuleService, ctx: CommandContext) -> HandlerResult {
    let Some(entry) = ctx.arg(0).and_then(|name| svc.registry().command(name)) else {
        return ctx.reply("What command?").await;
    };

    let mut msg = format!("**Help for {}**\n{}", entry.name, entry.description);
    if !entry.help_text.is_empty() {
        msg.push_str(&format!("\n\n{}", entry.help_text));
    }
    if let Some(module) = &entry.module {
        msg.push_str(&format!("\nFrom module `{}`", module));
    }
    if entry.min_permission > PermissionLevel::None {
        msg.push_str(&format!("\nRequires {}", entry.min_permission));
    }
    msg.push_str(&format!("\n{}", trigger_hint(entry.triggers, &svc.prefix())));
    if let Some(id) = &entry.id {
        msg.push_str(&format!("\n`{}`", id));
    }
    ctx.reply(msg).await
}

/// How a command has to be addressed. `/cmd@bot` counts as a mention, so
/// prefix-only commands have to be sent without the `@bot` suffix.
fn trigger_hint(triggers: TriggerMask, prefix: &str) -> String {
    let prefixed = triggers.contains(Trigger::PrefixedMessage);
    let mention = triggers.contains(Trigger::DirectMention);
    match (prefixed, mention) {
        (true, true) => format!("Answers to `{}` or a mention", prefix),
        (true, false) => format!("Answers to `{}` only, not to mentions", prefix),
        (false, true) => "Answers to mentions only".to_string(),
        (false, false) => "Never triggered".to_string(),
    }
}

async fn change_prefix(svc: ModuleService, ctx: CommandContext) -> HandlerResult {
    let Some(prefix) = ctx.arg(0) else {
        return ctx.reply("What prefix?").await;
    };

    let old = svc.prefix();
    match svc.set_prefix(prefix) {
        Ok(()) => {
            ctx.reply(format!("Command prefix changed to **{}** successfully!", svc.prefix()))
                .await
        }
        Err(e) => {
            tracing::warn!("Prefix change to {} failed: {}", prefix, e);
            ctx.reply(format!(
                "Unable to change prefix to `{}`. Falling back to `{}`.",
                prefix, old
            ))
            .await
        }
    }
}

async fn os_info(_svc: ModuleService, ctx: CommandContext) -> HandlerResult {
    ctx.reply(format!(
        "I'm currently being hosted on a system running `{} ({})`~!",
        std::env::consts::OS,
        std::env::consts::ARCH
    ))
    .await?;
    if cfg!(target_os = "macos") {
        ctx.reply("My favourite!").await?;
    }
    Ok(())
}
