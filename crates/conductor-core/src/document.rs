//! XML documents exchanged with conductor hosts.
//!
//! Every [`Command`] maps to exactly one document whose root element names
//! the operation. Documents are written with two-space indentation; hosts
//! ignore whitespace between elements.

use quick_xml::events::Event;
use serde::Serialize;

use crate::command::Command;
use crate::error::CoreError;

/// Username sent with `use`. Hosts do not check credentials yet.
pub const PLACEHOLDER_USERNAME: &str = "exampleUser";
/// Password sent with `use`.
pub const PLACEHOLDER_PASSWORD: &str = "examplePass";

/// `<Auth>`: sent when a host is selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename = "Auth", rename_all = "PascalCase")]
pub struct AuthDocument {
    pub username: String,
    pub password: String,
}

/// `<List>`: list every pod on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename = "List", rename_all = "PascalCase")]
pub struct ListDocument {
    pub action: String,
}

/// `<Start>`: run a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename = "Start", rename_all = "PascalCase")]
pub struct StartDocument {
    pub hash: String,
    pub unique_id: String,
    pub time: String,
}

/// `<Stop>`: stop a pod instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename = "Stop", rename_all = "PascalCase")]
pub struct StopDocument {
    pub unique_id: String,
}

/// `<Running/>`: list running pod instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename = "Running")]
pub struct RunningDocument;

/// `<Status>`: query one pod instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename = "Status", rename_all = "PascalCase")]
pub struct StatusDocument {
    pub unique_id: String,
}

/// `<Add>`: register a pod.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename = "Add", rename_all = "PascalCase")]
pub struct AddDocument {
    pub pod_name: String,
    pub images: ImageList,
    pub external_image: String,
    pub metadata: MetadataList,
    pub internal_port: i64,
}

/// `<Images><Image>..</Image>...</Images>`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ImageList {
    #[serde(rename = "Image")]
    pub items: Vec<String>,
}

/// `<Metadata><Item>..</Item>...</Metadata>`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MetadataList {
    #[serde(rename = "Item")]
    pub items: Vec<String>,
}

/// Serialize a command into its wire document.
pub fn encode(command: &Command) -> Result<String, CoreError> {
    match command {
        Command::Use => to_xml(&AuthDocument {
            username: PLACEHOLDER_USERNAME.into(),
            password: PLACEHOLDER_PASSWORD.into(),
        }),
        Command::ListPods => to_xml(&ListDocument {
            action: "all".into(),
        }),
        Command::RunPod {
            hash,
            unique_id,
            ttl_hours,
        } => to_xml(&StartDocument {
            hash: hash.clone(),
            unique_id: unique_id.clone(),
            time: ttl_hours.clone(),
        }),
        Command::StopPod { unique_id } => to_xml(&StopDocument {
            unique_id: unique_id.clone(),
        }),
        Command::RunningPods => to_xml(&RunningDocument),
        Command::PodStatus { unique_id } => to_xml(&StatusDocument {
            unique_id: unique_id.clone(),
        }),
        Command::AddPod {
            name,
            internal_port,
            images,
            external_image,
            metadata,
        } => to_xml(&AddDocument {
            pod_name: name.clone(),
            images: ImageList {
                items: images.clone(),
            },
            external_image: external_image.clone(),
            metadata: MetadataList {
                items: metadata.clone(),
            },
            internal_port: *internal_port,
        }),
    }
}

/// Parse a wire document back into the command it encodes.
///
/// This is what a conforming host does with the payload; the placeholder
/// credentials of `<Auth>` are accepted and dropped. Element text is taken
/// verbatim, surrounding whitespace included.
pub fn decode(payload: &[u8]) -> Result<Command, CoreError> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| CoreError::Deserialization(format!("payload is not UTF-8: {}", e)))?;
    let root = parse_tree(text)?;

    let command = match root.name.as_str() {
        "Auth" => {
            root.text_of("Username")?;
            root.text_of("Password")?;
            Command::Use
        }
        "List" => {
            root.text_of("Action")?;
            Command::ListPods
        }
        "Start" => Command::RunPod {
            hash: root.text_of("Hash")?,
            unique_id: root.text_of("UniqueId")?,
            ttl_hours: root.text_of("Time")?,
        },
        "Stop" => Command::StopPod {
            unique_id: root.text_of("UniqueId")?,
        },
        "Running" => Command::RunningPods,
        "Status" => Command::PodStatus {
            unique_id: root.text_of("UniqueId")?,
        },
        "Add" => {
            let port = root.text_of("InternalPort")?;
            Command::AddPod {
                name: root.text_of("PodName")?,
                internal_port: port.trim().parse().map_err(|_| {
                    CoreError::Deserialization(format!("<InternalPort> is not an integer: {}", port))
                })?,
                images: root.child("Images")?.texts_of("Image"),
                external_image: root.text_of("ExternalImage")?,
                metadata: root.child("Metadata")?.texts_of("Item"),
            }
        }
        other => {
            return Err(CoreError::Deserialization(format!(
                "unknown document <{}>",
                other
            )))
        }
    };

    Ok(command)
}

fn to_xml<T: Serialize>(document: &T) -> Result<String, CoreError> {
    let mut buffer = String::new();
    let mut serializer = quick_xml::se::Serializer::new(&mut buffer);
    serializer.indent(' ', 2);
    document
        .serialize(serializer)
        .map_err(|e| CoreError::Serialization(e.to_string()))?;
    Ok(buffer)
}

/// An element of a parsed document. `text` is only kept for leaf elements.
#[derive(Debug, Default)]
struct Element {
    name: String,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn named(name: &[u8]) -> Self {
        Self {
            name: String::from_utf8_lossy(name).into_owned(),
            ..Self::default()
        }
    }

    fn child(&self, name: &str) -> Result<&Element, CoreError> {
        self.children
            .iter()
            .find(|child| child.name == name)
            .ok_or_else(|| {
                CoreError::Deserialization(format!("<{}> is missing <{}>", self.name, name))
            })
    }

    fn text_of(&self, name: &str) -> Result<String, CoreError> {
        self.child(name).map(|child| child.text.clone())
    }

    /// Text of every child called `name`, in document order.
    fn texts_of(&self, name: &str) -> Vec<String> {
        self.children
            .iter()
            .filter(|child| child.name == name)
            .map(|child| child.text.clone())
            .collect()
    }
}

fn parse_tree(text: &str) -> Result<Element, CoreError> {
    let mut reader = quick_xml::Reader::from_str(text);
    reader.config_mut().trim_text(false);

    let mut open: Vec<Element> = Vec::new();
    loop {
        let event = reader
            .read_event()
            .map_err(|e| CoreError::Deserialization(e.to_string()))?;
        match event {
            Event::Start(start) => open.push(Element::named(start.name().as_ref())),
            Event::Empty(empty) => {
                let element = Element::named(empty.name().as_ref());
                match open.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::Text(content) => {
                if let Some(current) = open.last_mut() {
                    let unescaped = content
                        .unescape()
                        .map_err(|e| CoreError::Deserialization(e.to_string()))?;
                    current.text.push_str(&unescaped);
                }
            }
            Event::CData(content) => {
                if let Some(current) = open.last_mut() {
                    let raw = std::str::from_utf8(&content)
                        .map_err(|e| CoreError::Deserialization(e.to_string()))?;
                    current.text.push_str(raw);
                }
            }
            Event::End(_) => {
                let mut element = open
                    .pop()
                    .ok_or_else(|| CoreError::Deserialization("unbalanced end tag".into()))?;
                if !element.children.is_empty() {
                    // indentation between child elements
                    element.text.clear();
                }
                match open.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::Eof => {
                return Err(CoreError::Deserialization(if open.is_empty() {
                    "empty document".into()
                } else {
                    "unexpected end of document".into()
                }))
            }
            _ => {}
        }
    }
}

/// Name of the first element in `text`.
fn root_element(text: &str) -> Result<String, CoreError> {
    parse_tree(text).map(|root| root.name)
}
