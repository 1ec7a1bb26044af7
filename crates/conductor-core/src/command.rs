//! Pod lifecycle commands issued to a conductor host.
//!
//! The operator types a line such as `run <hash> <id> <ttl>`; the first token
//! selects a [`CommandKind`] and the remaining tokens are positional arguments
//! with an exact count per kind. A parsed [`Command`] is validated and then
//! encoded into the XML document carried on the wire (see [`crate::document`]).

use std::fmt;

use crate::document;
use crate::error::CoreError;

/// The verb of an operator command, before its arguments are parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Select a host and authenticate against it.
    Use,
    /// List the pods known to the host.
    List,
    /// Start a pod.
    Run,
    /// Stop a running pod.
    Stop,
    /// List the running pods.
    Running,
    /// Query the status of a pod.
    Status,
    /// Register a new pod.
    Add,
}

impl CommandKind {
    /// Every command kind, in the order the help summary lists them.
    pub const ALL: [CommandKind; 7] = [
        Self::Use,
        Self::Add,
        Self::Status,
        Self::Running,
        Self::Run,
        Self::Stop,
        Self::List,
    ];

    /// Resolve the leading token of an input line.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "use" => Some(Self::Use),
            "list" => Some(Self::List),
            "run" => Some(Self::Run),
            "stop" => Some(Self::Stop),
            "running" => Some(Self::Running),
            "status" => Some(Self::Status),
            "add" => Some(Self::Add),
            _ => None,
        }
    }

    /// The token the operator types for this kind.
    pub fn token(&self) -> &'static str {
        match self {
            Self::Use => "use",
            Self::List => "list",
            Self::Run => "run",
            Self::Stop => "stop",
            Self::Running => "running",
            Self::Status => "status",
            Self::Add => "add",
        }
    }

    /// Exact number of positional arguments.
    pub fn arity(&self) -> usize {
        match self {
            Self::List | Self::Running => 0,
            Self::Use | Self::Stop | Self::Status => 1,
            Self::Run => 3,
            Self::Add => 5,
        }
    }

    /// Whether the command is addressed to the selected host.
    ///
    /// `use` is the only command that may be issued with no selection, since
    /// it is the one that makes it.
    pub fn requires_selection(&self) -> bool {
        !matches!(self, Self::Use)
    }

    /// What the operator is trying to do, for the "select a host" message.
    pub fn purpose(&self) -> &'static str {
        match self {
            Self::Use => "communicate with",
            Self::List => "print the pods",
            Self::Run => "run the pod",
            Self::Stop => "stop the pod",
            Self::Running => "print the running pods",
            Self::Status => "print the pod status",
            Self::Add => "add the pod",
        }
    }

    /// One-line description used by the help summary.
    pub fn summary(&self) -> &'static str {
        match self {
            Self::Use => "Select a host for communication.",
            Self::List => "Print all available Pods on the selected host.",
            Self::Run => "Run the Pod on the selected host.",
            Self::Stop => "Stop the Pod on the selected host.",
            Self::Running => "View all running pods on the selected host.",
            Self::Status => "Get the status of the Pod by unique identifier on the selected host.",
            Self::Add => "Add Pod to the database on the selected host.",
        }
    }

    /// Usage example printed when the argument count is wrong.
    pub fn usage(&self) -> &'static str {
        match self {
            Self::Use => "Example: use <host id from the providers list>",
            Self::List => "Example: list",
            Self::Run => "Example: run <hash of Pod> <unique ID> <lifetime in hours>",
            Self::Stop => "Example: stop <Unique ID>",
            Self::Running => "Example: running",
            Self::Status => "Example: status <Unique ID>",
            Self::Add => ADD_USAGE,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

const ADD_USAGE: &str = "\
Example of calling the add command:
add PodName 80 image1,image2 image1 metadata1,metadata2

PodName - pod name for convenient identification in the system
80 - numeric value that specifies the internal port of the container
image1,image2 - list of images that will be launched when the pod is started. Values should be specified separated by commas
image1 - image that will look outward. This value must match one of the previous values. All other containers will be available on the Pod's local network.
metadata1,metadata2 - comma separated list of values. This field is optional and is used for convenient identification or sorting of Pods on the host.";

/// A fully parsed pod lifecycle command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Authenticate against the newly selected host.
    Use,
    /// List every pod registered on the host.
    ListPods,
    /// Start the pod identified by `hash` under `unique_id` for `ttl_hours`.
    RunPod {
        hash: String,
        unique_id: String,
        /// Lifetime as typed by the operator; the host interprets it.
        ttl_hours: String,
    },
    /// Stop a running pod instance.
    StopPod { unique_id: String },
    /// List running pod instances.
    RunningPods,
    /// Query one pod instance.
    PodStatus { unique_id: String },
    /// Register a pod made of one or more images.
    AddPod {
        name: String,
        internal_port: i64,
        images: Vec<String>,
        external_image: String,
        metadata: Vec<String>,
    },
}

impl Command {
    /// Build a command of `kind` from its positional arguments.
    pub fn parse(kind: CommandKind, args: &[&str]) -> Result<Self, CoreError> {
        check_arity(kind, args)?;

        let command = match (kind, args) {
            (CommandKind::Use, [index]) => {
                parse_index(index)?;
                Self::Use
            }
            (CommandKind::List, []) => Self::ListPods,
            (CommandKind::Running, []) => Self::RunningPods,
            (CommandKind::Run, [hash, unique_id, ttl_hours]) => Self::RunPod {
                hash: (*hash).to_string(),
                unique_id: (*unique_id).to_string(),
                ttl_hours: (*ttl_hours).to_string(),
            },
            (CommandKind::Stop, [unique_id]) => Self::StopPod {
                unique_id: (*unique_id).to_string(),
            },
            (CommandKind::Status, [unique_id]) => Self::PodStatus {
                unique_id: (*unique_id).to_string(),
            },
            (CommandKind::Add, [name, port, images, external_image, metadata]) => Self::AddPod {
                name: (*name).to_string(),
                internal_port: port.parse().map_err(|_| CoreError::NotANumber {
                    field: "internal port",
                    value: (*port).to_string(),
                })?,
                images: split_list(images),
                external_image: (*external_image).to_string(),
                metadata: split_list(metadata),
            },
            // check_arity guarantees the slice patterns above are exhaustive
            _ => {
                return Err(CoreError::ArgumentCount {
                    kind,
                    expected: kind.arity(),
                    actual: args.len(),
                })
            }
        };

        Ok(command)
    }

    /// The kind this command was parsed from.
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Use => CommandKind::Use,
            Self::ListPods => CommandKind::List,
            Self::RunPod { .. } => CommandKind::Run,
            Self::StopPod { .. } => CommandKind::Stop,
            Self::RunningPods => CommandKind::Running,
            Self::PodStatus { .. } => CommandKind::Status,
            Self::AddPod { .. } => CommandKind::Add,
        }
    }

    /// Check invariants that span several fields.
    pub fn validate(&self) -> Result<(), CoreError> {
        if let Self::AddPod {
            images,
            external_image,
            ..
        } = self
        {
            if !images.iter().any(|image| image == external_image) {
                return Err(CoreError::ExternalImageNotListed {
                    external: external_image.clone(),
                    images: images.clone(),
                });
            }
        }
        Ok(())
    }

    /// Serialize into the wire document.
    pub fn encode(&self) -> Result<Vec<u8>, CoreError> {
        document::encode(self).map(String::into_bytes)
    }
}

/// Parse the host index argument of `use <index>`.
///
/// Negative values parse successfully; the bounds check belongs to the peer
/// directory.
pub fn parse_use(args: &[&str]) -> Result<i64, CoreError> {
    check_arity(CommandKind::Use, args)?;
    parse_index(args[0])
}

fn parse_index(raw: &str) -> Result<i64, CoreError> {
    raw.parse().map_err(|_| CoreError::NotANumber {
        field: "host id",
        value: raw.to_string(),
    })
}

fn check_arity(kind: CommandKind, args: &[&str]) -> Result<(), CoreError> {
    if args.len() != kind.arity() {
        return Err(CoreError::ArgumentCount {
            kind,
            expected: kind.arity(),
            actual: args.len(),
        });
    }
    Ok(())
}

/// Split a comma-separated argument, keeping order, empties and duplicates.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',').map(str::to_string).collect()
}
