use opsrelay_exec::{Operation, OperationKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    /// Command name without the slash or `@bot` suffix.
    pub name: &'a str,
    /// Bot username after `@`, when the command names one.
    pub mention: Option<&'a str>,
    pub args: &'a str,
}

impl ParsedCommand<'_> {
    /// A command without a mention is addressed to every bot in the chat. With
    /// no known username every mention is accepted.
    pub fn is_addressed_to(&self, bot_username: Option<&str>) -> bool {
        match (self.mention, bot_username) {
            (Some(mention), Some(username)) => mention.eq_ignore_ascii_case(username),
            _ => true,
        }
    }
}

/// Splits `/name@bot rest of line` into its name, mention and argument text.
/// Returns `None` for anything that is not a slash command.
pub fn parse_command(input: &str) -> Option<ParsedCommand<'_>> {
    let trimmed = input.trim();
    let body = trimmed.strip_prefix('/')?;
    let mut parts = body.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or_default();
    let (name, mention) = match head.split_once('@') {
        Some((name, mention)) => (name, Some(mention)),
        None => (head, None),
    };
    if name.is_empty() {
        return None;
    }
    let args = parts.next().map(str::trim).unwrap_or_default();
    Some(ParsedCommand {
        name,
        mention,
        args,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayCommand {
    Start,
    Help { topic: Option<String> },
    Auth { secret: Option<String> },
    Run(Operation),
    MonitorStart,
    MonitorStop,
    Unknown { name: String },
}

impl RelayCommand {
    /// Name used in logs. Never includes arguments.
    pub fn log_name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help { .. } => "help",
            Self::Auth { .. } => "auth",
            Self::Run(operation) => operation.kind.command_name(),
            Self::MonitorStart => "monitor_start",
            Self::MonitorStop => "monitor_stop",
            Self::Unknown { .. } => "unknown",
        }
    }
}

/// Returns `None` for plain text and for commands addressed to another bot.
pub fn parse_relay_command(input: &str, bot_username: Option<&str>) -> Option<RelayCommand> {
    let parsed = parse_command(input)?;
    if !parsed.is_addressed_to(bot_username) {
        return None;
    }
    let args = (!parsed.args.is_empty()).then(|| parsed.args.to_string());
    let command = match parsed.name {
        "start" => RelayCommand::Start,
        "help" => RelayCommand::Help { topic: args },
        "auth" => RelayCommand::Auth { secret: args },
        "monitor_start" => RelayCommand::MonitorStart,
        "monitor_stop" => RelayCommand::MonitorStop,
        name => match OperationKind::from_command_name(name) {
            Some(kind) => RelayCommand::Run(Operation {
                kind,
                argument: args,
            }),
            None => RelayCommand::Unknown {
                name: name.to_string(),
            },
        },
    };
    Some(command)
}
