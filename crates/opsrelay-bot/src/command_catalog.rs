use opsrelay_transport::CommandMenuEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    /// Bare command name, without the leading slash.
    pub name: &'static str,
    pub usage: &'static str,
    pub description: &'static str,
    pub example: &'static str,
}

pub const RELAY_COMMAND_SPECS: &[CommandSpec] = &[
    CommandSpec {
        name: "start",
        usage: "/start",
        description: "Show the welcome message",
        example: "/start",
    },
    CommandSpec {
        name: "help",
        usage: "/help [command]",
        description: "List commands or show one command in detail",
        example: "/help ping",
    },
    CommandSpec {
        name: "auth",
        usage: "/auth <password>",
        description: "Open a time-limited session",
        example: "/auth hunter2",
    },
    CommandSpec {
        name: "disk",
        usage: "/disk",
        description: "Show disk usage",
        example: "/disk",
    },
    CommandSpec {
        name: "usage",
        usage: "/usage",
        description: "Show load average and memory usage",
        example: "/usage",
    },
    CommandSpec {
        name: "service_status",
        usage: "/service_status <service name>",
        description: "Show systemd status of a service",
        example: "/service_status nginx",
    },
    CommandSpec {
        name: "restart_service",
        usage: "/restart_service <service name>",
        description: "Restart a systemd service",
        example: "/restart_service nginx",
    },
    CommandSpec {
        name: "main_services_status",
        usage: "/main_services_status",
        description: "Show whether the main services are active",
        example: "/main_services_status",
    },
    CommandSpec {
        name: "ping",
        usage: "/ping <host>",
        description: "Send four ICMP echo requests to a host",
        example: "/ping google.com",
    },
    CommandSpec {
        name: "traceroute",
        usage: "/traceroute <host>",
        description: "Trace the network path to a host",
        example: "/traceroute google.com",
    },
    CommandSpec {
        name: "update",
        usage: "/update",
        description: "Refresh the package index",
        example: "/update",
    },
    CommandSpec {
        name: "upgrade",
        usage: "/upgrade",
        description: "Install available package upgrades",
        example: "/upgrade",
    },
    CommandSpec {
        name: "network_status",
        usage: "/network_status",
        description: "Show network interfaces and addresses",
        example: "/network_status",
    },
    CommandSpec {
        name: "reboot",
        usage: "/reboot",
        description: "Reboot the host",
        example: "/reboot",
    },
    CommandSpec {
        name: "backup",
        usage: "/backup",
        description: "Archive configured paths and send the archive",
        example: "/backup",
    },
    CommandSpec {
        name: "monitor_start",
        usage: "/monitor_start",
        description: "Receive periodic usage and disk reports",
        example: "/monitor_start",
    },
    CommandSpec {
        name: "monitor_stop",
        usage: "/monitor_stop",
        description: "Stop periodic reports",
        example: "/monitor_stop",
    },
];

pub fn find_command_spec(name: &str) -> Option<&'static CommandSpec> {
    let name = name.trim().trim_start_matches('/');
    RELAY_COMMAND_SPECS.iter().find(|spec| spec.name == name)
}

/// Entries registered as the chat client's command menu.
pub fn command_menu() -> Vec<CommandMenuEntry> {
    RELAY_COMMAND_SPECS
        .iter()
        .map(|spec| CommandMenuEntry {
            command: spec.name.to_string(),
            description: spec.description.to_string(),
        })
        .collect()
}

pub fn render_help_overview() -> String {
    let mut lines = vec!["commands:".to_string()];
    for spec in RELAY_COMMAND_SPECS {
        lines.push(format!("  {:<32} {}", spec.usage, spec.description));
    }
    lines.push("tip: /help <command> shows details".to_string());
    lines.join("\n")
}

pub fn render_command_help(topic: &str) -> Option<String> {
    let spec = find_command_spec(topic)?;
    Some(format!(
        "command: /{}\nusage: {}\n{}\nexample: {}",
        spec.name, spec.usage, spec.description, spec.example
    ))
}

pub fn unknown_command_message(command: &str) -> String {
    match suggest_command(command) {
        Some(suggestion) => format!(
            "unknown command: /{command}\ndid you mean /{suggestion}?\n\
             run /help for the command list"
        ),
        None => format!("unknown command: /{command}\nrun /help for the command list"),
    }
}

fn suggest_command(command: &str) -> Option<&'static str> {
    if command.is_empty() {
        return None;
    }
    if let Some(prefix_match) = RELAY_COMMAND_SPECS
        .iter()
        .map(|spec| spec.name)
        .find(|name| name.starts_with(command))
    {
        return Some(prefix_match);
    }
    let (candidate, distance) = RELAY_COMMAND_SPECS
        .iter()
        .map(|spec| (spec.name, edit_distance(command, spec.name)))
        .min_by_key(|(_, distance)| *distance)?;
    let threshold = match command.len() {
        0..=4 => 1,
        5..=8 => 2,
        _ => 3,
    };
    (distance <= threshold).then_some(candidate)
}

fn edit_distance(left: &str, right: &str) -> usize {
    let right = right.chars().collect::<Vec<_>>();
    let mut previous = (0..=right.len()).collect::<Vec<_>>();
    for (i, left_char) in left.chars().enumerate() {
        let mut current = vec![i + 1; right.len() + 1];
        for (j, right_char) in right.iter().enumerate() {
            let substitution = previous[j] + usize::from(left_char != *right_char);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        previous = current;
    }
    previous[right.len()]
}
