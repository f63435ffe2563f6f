//! SQLite row types and their conversion into the `murmur-types` wire models.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use murmur_types::models::{Channel, ChannelMessage, MemberSummary, Message, User};

#[derive(Debug)]
pub struct UserRow {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub profile_pic: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug)]
pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub creator_id: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug)]
pub struct MemberRow {
    pub channel_id: String,
    pub user_id: String,
    pub full_name: String,
}

#[derive(Debug)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub receiver_id: Option<String>,
    pub channel_id: Option<String>,
    pub text: String,
    pub image: Option<String>,
    pub created_at: String,
}

impl UserRow {
    /// Drops the password hash.
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            full_name: self.full_name,
            email: self.email,
            profile_pic: self.profile_pic,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

impl ChannelRow {
    /// Assembles a channel from its row and the member rows belonging to it.
    /// Member rows for other channels are ignored.
    pub fn into_channel(self, members: &[MemberRow]) -> Result<Channel> {
        let members = members
            .iter()
            .filter(|m| m.channel_id == self.id)
            .map(|m| {
                Ok(MemberSummary {
                    id: parse_id(&m.user_id)?,
                    full_name: m.full_name.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Channel {
            id: parse_id(&self.id)?,
            name: self.name,
            creator: parse_id(&self.creator_id)?,
            members,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        let receiver_id = self
            .receiver_id
            .as_deref()
            .with_context(|| format!("message {} has no receiver", self.id))?;

        Ok(Message {
            id: parse_id(&self.id)?,
            sender_id: parse_id(&self.sender_id)?,
            receiver_id: parse_id(receiver_id)?,
            text: self.text,
            image: self.image,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }

    pub fn into_channel_message(self) -> Result<ChannelMessage> {
        let channel_id = self
            .channel_id
            .as_deref()
            .with_context(|| format!("message {} has no channel", self.id))?;

        Ok(ChannelMessage {
            id: parse_id(&self.id)?,
            sender: MemberSummary {
                id: parse_id(&self.sender_id)?,
                full_name: self.sender_name,
            },
            channel_id: parse_id(channel_id)?,
            text: self.text,
            image: self.image,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("corrupt id '{}'", raw))
}

/// Accepts the RFC 3339 form the schema defaults write, and the bare
/// `YYYY-MM-DD HH:MM:SS` form of SQLite's `datetime('now')`.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .with_context(|| format!("corrupt timestamp '{}'", raw))
}
