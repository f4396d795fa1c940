use std::fmt;

/// Privileged actions the gateway knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    DiskUsage,
    ResourceUsage,
    ServiceStatus,
    ServiceRestart,
    MainServicesStatus,
    Ping,
    Traceroute,
    PackageUpdate,
    PackageUpgrade,
    NetworkStatus,
    Reboot,
    Backup,
}

impl OperationKind {
    pub const ALL: [OperationKind; 12] = [
        Self::DiskUsage,
        Self::ResourceUsage,
        Self::ServiceStatus,
        Self::ServiceRestart,
        Self::MainServicesStatus,
        Self::Ping,
        Self::Traceroute,
        Self::PackageUpdate,
        Self::PackageUpgrade,
        Self::NetworkStatus,
        Self::Reboot,
        Self::Backup,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::DiskUsage => "disk-usage",
            Self::ResourceUsage => "resource-usage",
            Self::ServiceStatus => "service-status",
            Self::ServiceRestart => "service-restart",
            Self::MainServicesStatus => "main-services-status",
            Self::Ping => "ping",
            Self::Traceroute => "traceroute",
            Self::PackageUpdate => "package-update",
            Self::PackageUpgrade => "package-upgrade",
            Self::NetworkStatus => "network-status",
            Self::Reboot => "reboot",
            Self::Backup => "backup",
        }
    }

    /// Chat command that maps 1:1 onto this kind.
    pub fn command_name(self) -> &'static str {
        match self {
            Self::DiskUsage => "disk",
            Self::ResourceUsage => "usage",
            Self::ServiceStatus => "service_status",
            Self::ServiceRestart => "restart_service",
            Self::MainServicesStatus => "main_services_status",
            Self::Ping => "ping",
            Self::Traceroute => "traceroute",
            Self::PackageUpdate => "update",
            Self::PackageUpgrade => "upgrade",
            Self::NetworkStatus => "network_status",
            Self::Reboot => "reboot",
            Self::Backup => "backup",
        }
    }

    pub fn from_command_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.command_name() == name)
    }

    pub fn argument(self) -> Option<ArgumentSpec> {
        match self {
            Self::ServiceStatus | Self::ServiceRestart => Some(ArgumentSpec {
                label: "service name",
                example: "nginx",
            }),
            Self::Ping | Self::Traceroute => Some(ArgumentSpec {
                label: "host",
                example: "google.com",
            }),
            _ => None,
        }
    }

    pub fn requires_argument(self) -> bool {
        self.argument().is_some()
    }

    /// Mutates host state; output is reported verbatim with no rollback.
    pub fn is_mutating(self) -> bool {
        matches!(
            self,
            Self::ServiceRestart | Self::PackageUpdate | Self::PackageUpgrade | Self::Reboot
        )
    }

    pub fn is_network_facing(self) -> bool {
        matches!(self, Self::Ping | Self::Traceroute)
    }

    pub fn usage(self) -> String {
        match self.argument() {
            Some(spec) => format!("/{} <{}>", self.command_name(), spec.label),
            None => format!("/{}", self.command_name()),
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgumentSpec {
    pub label: &'static str,
    pub example: &'static str,
}

/// One requested action: a kind plus zero or one free-text argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    pub argument: Option<String>,
}

impl Operation {
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            argument: None,
        }
    }

    pub fn with_argument(kind: OperationKind, argument: impl Into<String>) -> Self {
        Self {
            kind,
            argument: Some(argument.into()),
        }
    }

    /// Checks the argument contract before anything is launched.
    ///
    /// Returns the normalized argument for kinds that take one.
    pub fn validate(&self) -> Result<Option<String>, ArgumentRejection> {
        let Some(spec) = self.kind.argument() else {
            return Ok(None);
        };
        let value = self
            .argument
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ArgumentRejection::Missing {
                kind: self.kind,
                spec,
            })?;
        if value.starts_with('-') {
            return Err(ArgumentRejection::OptionLike {
                kind: self.kind,
                value: value.to_string(),
            });
        }
        if value
            .chars()
            .any(|ch| ch.is_whitespace() || ch.is_control())
        {
            return Err(ArgumentRejection::Malformed {
                kind: self.kind,
                spec,
            });
        }
        Ok(Some(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentRejection {
    Missing {
        kind: OperationKind,
        spec: ArgumentSpec,
    },
    OptionLike {
        kind: OperationKind,
        value: String,
    },
    Malformed {
        kind: OperationKind,
        spec: ArgumentSpec,
    },
}

impl ArgumentRejection {
    pub fn usage_hint(&self) -> String {
        match self {
            Self::Missing { kind, spec } => format!(
                "missing {label}: usage {usage}, for example /{name} {example}",
                label = spec.label,
                usage = kind.usage(),
                name = kind.command_name(),
                example = spec.example
            ),
            Self::OptionLike { kind, value } => format!(
                "argument '{value}' must not start with '-': usage {}",
                kind.usage()
            ),
            Self::Malformed { kind, spec } => format!(
                "{} must be a single word without spaces: usage {}",
                spec.label,
                kind.usage()
            ),
        }
    }
}
