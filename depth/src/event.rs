//! Parsing for the line-oriented event bodies returned by the stream poll
//! endpoint:
//!
//! ```text
//! event: complete
//! data: [null, {"path": "/tmp/depth.png"}, null]
//!
//! ```

/// Body sent when the job errored. The provider gives no further detail.
pub const ERROR_EVENT: &str = "event: error\ndata: null\n\n";

pub const COMPLETE_EVENT: &str = "event: complete";

const EVENT_PREFIX: &str = "event: ";
const DATA_PREFIX: &str = "data: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBlock {
    pub event: String,
    pub data: Vec<String>,
}

/// What a single poll body tells us about the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventBody {
    Error,
    /// Concatenated payload of every data line, in order.
    Complete(String),
    Pending,
}

impl EventBody {
    pub fn classify(body: &str) -> Self {
        if body == ERROR_EVENT {
            return Self::Error;
        }
        if !body.starts_with(COMPLETE_EVENT) {
            return Self::Pending;
        }
        let payload = body
            .lines()
            .filter_map(|line| line.strip_prefix(DATA_PREFIX))
            .collect::<String>();
        Self::Complete(payload)
    }
}

/// Split a body into its event blocks, for logging what a pending job is
/// reporting. Job state is decided by [`EventBody::classify`] alone.
///
/// Blocks are separated by blank lines; lines that are neither `event:` nor
/// `data:` are ignored.
pub fn parse_blocks(body: &str) -> Vec<EventBlock> {
    let mut blocks = Vec::new();
    let mut current: Option<EventBlock> = None;
    for line in body.lines() {
        if line.is_empty() {
            blocks.extend(current.take());
        } else if let Some(event) = line.strip_prefix(EVENT_PREFIX) {
            blocks.extend(current.take());
            current = Some(EventBlock {
                event: event.to_string(),
                data: Vec::new(),
            });
        } else if let Some(data) = line.strip_prefix(DATA_PREFIX) {
            current
                .get_or_insert_with(|| EventBlock {
                    event: String::new(),
                    data: Vec::new(),
                })
                .data
                .push(data.to_string());
        }
    }
    blocks.extend(current);
    blocks
}
