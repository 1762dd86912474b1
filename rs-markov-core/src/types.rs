use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_type {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
		#[serde(transparent)]
		pub struct $name(String);

		impl $name {
			pub fn new(id: impl Into<String>) -> Self {
				Self(id.into())
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl From<&str> for $name {
			fn from(id: &str) -> Self {
				Self(id.to_owned())
			}
		}

		impl From<String> for $name {
			fn from(id: String) -> Self {
				Self(id)
			}
		}
	};
}

id_type!(
	/// Opaque identifier of a community (one chat group with its own corpus).
	CommunityId
);
id_type!(
	/// Opaque identifier of a channel inside a community.
	ChannelId
);
id_type!(
	/// Opaque identifier of a user, as delivered by the transport.
	UserId
);

/// A message as handed over by the transport collaborator.
///
/// `content` is the transport's "clean" rendering: mentions are already
/// rendered as `@DisplayName` text.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct IncomingMessage {
	pub community_id: CommunityId,
	pub channel_id: ChannelId,
	pub author_id: UserId,
	pub author_name: String,
	pub content: String,
}

/// How the bot appears inside a community.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BotIdentity {
	pub user_id: UserId,
	/// Display name used by members when addressing the bot.
	pub display_name: String,
}

impl BotIdentity {
	/// The mention token as it appears in clean message content.
	pub fn mention(&self) -> String {
		format!("@{}", self.display_name)
	}
}
