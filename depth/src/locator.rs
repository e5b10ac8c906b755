use crate::{error::LocateError, types::ResultReference};
use serde_json::Value;
use url::Url;

/// Output slot holding the grayscale depth map. Slot 0 is a side-by-side
/// slider view and slot 2 the 16-bit raw file.
pub const DEFAULT_DEPTH_SLOT: usize = 1;

pub const DEFAULT_PATH_FIELD: &str = "path";

/// Picks the depth artifact out of a provider's heterogeneous output array.
#[derive(Debug, Clone)]
pub struct ResultLocator {
    slot: usize,
    field: String,
    base: Url,
}

impl ResultLocator {
    pub fn new(base: Url, slot: usize, field: impl Into<String>) -> Self {
        Self {
            slot,
            field: field.into(),
            base,
        }
    }

    pub fn with_defaults(base: Url) -> Self {
        Self::new(base, DEFAULT_DEPTH_SLOT, DEFAULT_PATH_FIELD)
    }

    pub fn locate(&self, payload: &[Value]) -> Result<ResultReference, LocateError> {
        let entry = payload.get(self.slot).ok_or(LocateError::TooShort {
            len: payload.len(),
            slot: self.slot,
        })?;
        let Value::Object(fields) = entry else {
            return Err(LocateError::WrongShape { slot: self.slot });
        };
        match fields.get(&self.field) {
            Some(Value::String(raw)) => self.resolve(raw),
            _ => Err(LocateError::MissingField {
                field: self.field.clone(),
            }),
        }
    }

    /// Absolute http(s) urls are taken as-is, anything else is a server-side
    /// path served under `<base>/file=<path>`.
    fn resolve(&self, raw: &str) -> Result<ResultReference, LocateError> {
        if let Ok(url) = Url::parse(raw) {
            if matches!(url.scheme(), "http" | "https") {
                return Ok(ResultReference::new(url));
            }
        }
        let joined = format!("{}/file={}", self.base.as_str().trim_end_matches('/'), raw);
        Url::parse(&joined)
            .map(ResultReference::new)
            .map_err(|_| LocateError::BadReference(raw.to_string()))
    }
}
