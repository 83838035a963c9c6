use crate::config::SystemCommandEntry;
use crate::model::{Action, Candidate, ProviderId};
use crate::registry::{Provider, ProviderError, QueryContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemCommand {
    /// Bare word that selects exactly this command, e.g. `shutdown`.
    pub word: Option<String>,
    pub title: String,
    pub command: String,
    pub icon: String,
    pub description: String,
}

impl SystemCommand {
    fn new(word: Option<&str>, title: &str, command: &str, icon: &str, description: &str) -> Self {
        Self {
            word: word.map(str::to_string),
            title: title.to_string(),
            command: command.to_string(),
            icon: icon.to_string(),
            description: description.to_string(),
        }
    }

    fn candidate(&self) -> Candidate {
        Candidate::new(
            format!("system:{}", self.title.to_lowercase()),
            self.title.clone(),
            Action::SystemAction {
                command: self.command.clone(),
            },
        )
        .with_subtitle(self.description.clone())
        .with_icon(self.icon.clone())
    }
}

pub fn builtin_commands() -> Vec<SystemCommand> {
    vec![
        SystemCommand::new(Some("shutdown"), "Shutdown", "systemctl poweroff", "system-shutdown", "Power off the machine"),
        SystemCommand::new(Some("reboot"), "Reboot", "systemctl reboot", "system-reboot", "Restart the machine"),
        SystemCommand::new(Some("logout"), "Log Out", "i3-msg exit", "system-log-out", "Exit the i3 session"),
        SystemCommand::new(Some("lock"), "Lock", "loginctl lock-session", "system-lock-screen", "Lock the screen"),
        SystemCommand::new(Some("suspend"), "Suspend", "systemctl suspend", "system-suspend", "Suspend to RAM"),
        SystemCommand::new(None, "Reload i3", "i3-msg reload", "view-refresh", "Reload the i3 configuration"),
        SystemCommand::new(None, "Restart i3", "i3-msg restart", "view-refresh", "Restart i3 in place"),
    ]
}

pub struct SystemCommands {
    commands: Vec<SystemCommand>,
}

impl SystemCommands {
    pub fn new(commands: Vec<SystemCommand>) -> Self {
        Self { commands }
    }

    /// Built-ins plus configured entries; a configured word replaces the
    /// built-in command that owns it.
    pub fn with_extra(extra: &[SystemCommandEntry]) -> Self {
        let mut commands = builtin_commands();
        for entry in extra {
            let word = Some(entry.word.trim().to_lowercase()).filter(|w| !w.is_empty());
            let command = SystemCommand {
                word: word.clone(),
                title: entry.title.clone(),
                command: entry.command.clone(),
                icon: "system-run".to_string(),
                description: entry.command.clone(),
            };
            match commands
                .iter_mut()
                .find(|existing| word.is_some() && existing.word == word)
            {
                Some(existing) => *existing = command,
                None => commands.push(command),
            }
        }
        Self::new(commands)
    }

    pub fn commands(&self) -> &[SystemCommand] {
        &self.commands
    }

    pub fn words(&self) -> Vec<String> {
        self.commands.iter().filter_map(|c| c.word.clone()).collect()
    }
}

impl Provider for SystemCommands {
    fn id(&self) -> ProviderId {
        ProviderId::System
    }

    fn search(&self, query: &QueryContext) -> Result<Vec<Candidate>, ProviderError> {
        if let Some(prefix) = query.prefix.as_deref() {
            let named = self
                .commands
                .iter()
                .find(|c| c.word.as_deref().is_some_and(|w| w.eq_ignore_ascii_case(prefix)));
            if let Some(command) = named {
                return Ok(vec![command.candidate().pinned()]);
            }
        }
        Ok(self.commands.iter().map(SystemCommand::candidate).collect())
    }
}
