//! Emoji entity
//!
//! Guild-uploaded emoji carry an id and metadata; unicode emoji are just their
//! glyph. Both render differently in message content and reaction routes.

use crate::error::CoreError;
use crate::value_objects::Snowflake;
use serde::{Deserialize, Serialize};

/// An emoji as seen in guild payloads, reactions, and messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Emoji {
    /// Guild-uploaded emoji
    Custom {
        id: Snowflake,
        name: String,
        #[serde(default)]
        animated: bool,
        #[serde(default)]
        managed: bool,
        #[serde(default)]
        require_colons: bool,
        #[serde(default)]
        roles: Vec<Snowflake>,
    },
    /// Standard unicode emoji
    Unicode { name: String },
}

impl Emoji {
    /// Create a unicode emoji
    #[must_use]
    pub fn unicode(name: impl Into<String>) -> Self {
        Self::Unicode { name: name.into() }
    }

    /// Create a custom emoji with default flags
    #[must_use]
    pub fn custom(id: Snowflake, name: impl Into<String>, animated: bool) -> Self {
        Self::Custom {
            id,
            name: name.into(),
            animated,
            managed: false,
            require_colons: true,
            roles: Vec::new(),
        }
    }

    /// Parse the `name:id` / raw glyph form used in reaction routes
    pub fn from_reaction(value: &str) -> Result<Self, CoreError> {
        if value.is_empty() {
            return Err(CoreError::InvalidEmoji("empty emoji".to_string()));
        }
        match value.rsplit_once(':') {
            Some((name, id)) => {
                let id = Snowflake::parse(id)
                    .map_err(|_| CoreError::InvalidSnowflake(id.to_string()))?;
                let (animated, name) = match name.strip_prefix("a:") {
                    Some(rest) => (true, rest),
                    None => (false, name),
                };
                if name.is_empty() {
                    return Err(CoreError::InvalidEmoji(value.to_string()));
                }
                Ok(Self::custom(id, name, animated))
            }
            None => Ok(Self::unicode(value)),
        }
    }

    /// Emoji name (the glyph itself for unicode emoji)
    pub fn name(&self) -> &str {
        match self {
            Self::Custom { name, .. } | Self::Unicode { name } => name,
        }
    }

    /// Emoji id, only present for custom emoji
    pub fn id(&self) -> Option<Snowflake> {
        match self {
            Self::Custom { id, .. } => Some(*id),
            Self::Unicode { .. } => None,
        }
    }

    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom { .. })
    }

    #[must_use]
    pub fn is_unicode(&self) -> bool {
        !self.is_custom()
    }

    #[must_use]
    pub fn is_animated(&self) -> bool {
        matches!(self, Self::Custom { animated: true, .. })
    }

    /// Role ids allowed to use this emoji (empty means everyone)
    pub fn roles(&self) -> &[Snowflake] {
        match self {
            Self::Custom { roles, .. } => roles,
            Self::Unicode { .. } => &[],
        }
    }

    /// Form to embed in message content
    #[must_use]
    pub fn for_message(&self) -> String {
        match self {
            Self::Custom {
                id, name, animated, ..
            } => format!("<{}:{name}:{id}>", if *animated { "a" } else { "" }),
            Self::Unicode { name } => name.clone(),
        }
    }

    /// Form used in reaction endpoints
    #[must_use]
    pub fn for_reaction(&self) -> String {
        match self {
            Self::Custom { id, name, .. } => format!("{name}:{id}"),
            Self::Unicode { name } => name.clone(),
        }
    }
}
