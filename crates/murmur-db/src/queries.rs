use std::collections::HashSet;

use crate::Database;
use crate::models::{ChannelRow, MemberRow, MessageRow, UserRow};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, ErrorCode, Row};

/// SQL expression matching the column defaults in the migrations.
const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

const USER_COLUMNS: &str = "id, full_name, email, password, profile_pic, created_at, updated_at";

const CHANNEL_COLUMNS: &str = "id, name, creator_id, created_at, updated_at";

// JOIN users to fetch the sender name in a single query
const MESSAGE_SELECT: &str = "SELECT m.id, m.sender_id, u.full_name, m.receiver_id, m.channel_id, m.text, m.image, m.created_at
     FROM messages m
     LEFT JOIN users u ON m.sender_id = u.id";

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        full_name: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<UserRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, full_name, email, password) VALUES (?1, ?2, ?3, ?4)",
                (id, full_name, email, password_hash),
            )?;
            query_user(conn, "id", id)?.ok_or_else(|| anyhow!("User vanished after insert: {}", id))
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    /// Every user except `exclude_id`, oldest account first. A blank `search`
    /// means no name filter.
    pub fn list_users(&self, exclude_id: &str, search: Option<&str>) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let pattern = like_pattern(search);
            let sql = format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE id <> ?1 AND (?2 IS NULL OR fold_case(full_name) LIKE ?2 ESCAPE '\\')
                 ORDER BY created_at, rowid"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![exclude_id, pattern], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Updates the display name and, when given, the avatar. Returns the
    /// updated row, or `None` if the user does not exist.
    pub fn update_profile(
        &self,
        id: &str,
        full_name: &str,
        profile_pic: Option<&str>,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE users
                 SET full_name = ?2, profile_pic = COALESCE(?3, profile_pic), updated_at = {NOW}
                 WHERE id = ?1"
            );
            let changed = conn.execute(&sql, rusqlite::params![id, full_name, profile_pic])?;
            if changed == 0 {
                return Ok(None);
            }
            query_user(conn, "id", id)
        })
    }

    /// The subset of `ids` that belong to existing users.
    pub fn existing_user_ids(&self, ids: &[String]) -> Result<HashSet<String>> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        self.with_conn(|conn| {
            let sql = format!("SELECT id FROM users WHERE id IN ({})", placeholders(ids.len()));
            let mut stmt = conn.prepare(&sql)?;
            let found = stmt
                .query_map(rusqlite::params_from_iter(ids), |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<HashSet<_>, _>>()?;
            Ok(found)
        })
    }

    // -- Channels --

    /// Inserts the channel and its memberships in one transaction. The
    /// creator is always inserted as the first member; duplicates in
    /// `member_ids` (including the creator) are ignored.
    pub fn create_channel(
        &self,
        id: &str,
        name: &str,
        creator_id: &str,
        member_ids: &[String],
    ) -> Result<ChannelRow> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO channels (id, name, creator_id) VALUES (?1, ?2, ?3)",
                (id, name, creator_id),
            )?;
            tx.execute(
                "INSERT INTO channel_members (channel_id, user_id) VALUES (?1, ?2)",
                (id, creator_id),
            )?;
            insert_members(&tx, id, member_ids)?;
            tx.commit()?;

            query_channel(conn, id)?.ok_or_else(|| anyhow!("Channel vanished after insert: {}", id))
        })
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| query_channel(conn, id))
    }

    /// All channels, oldest first. A blank `search` means no name filter.
    pub fn list_channels(&self, search: Option<&str>) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let pattern = like_pattern(search);
            let sql = format!(
                "SELECT {CHANNEL_COLUMNS} FROM channels
                 WHERE (?1 IS NULL OR fold_case(name) LIKE ?1 ESCAPE '\\')
                 ORDER BY created_at, rowid"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([pattern], channel_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch members (with display names) for a set of channels, in join order.
    pub fn get_channel_members(&self, channel_ids: &[String]) -> Result<Vec<MemberRow>> {
        if channel_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT cm.channel_id, cm.user_id, u.full_name
                 FROM channel_members cm
                 JOIN users u ON cm.user_id = u.id
                 WHERE cm.channel_id IN ({})
                 ORDER BY cm.joined_at, cm.rowid",
                placeholders(channel_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(channel_ids), |row| {
                    Ok(MemberRow {
                        channel_id: row.get(0)?,
                        user_id: row.get(1)?,
                        full_name: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn is_channel_member(&self, channel_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                    (channel_id, user_id),
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Returns false if the channel does not exist.
    pub fn rename_channel(&self, id: &str, name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let sql = format!("UPDATE channels SET name = ?2, updated_at = {NOW} WHERE id = ?1");
            Ok(conn.execute(&sql, (id, name))? > 0)
        })
    }

    /// Adds members, ignoring ones already present.
    pub fn add_channel_members(&self, id: &str, member_ids: &[String]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            insert_members(&tx, id, member_ids)?;
            touch_channel(&tx, id)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Returns false if the user was not a member.
    pub fn remove_channel_member(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                (id, user_id),
            )?;
            if removed > 0 {
                touch_channel(&tx, id)?;
            }
            tx.commit()?;
            Ok(removed > 0)
        })
    }

    /// Deletes the channel; memberships and channel messages cascade.
    /// Returns false if the channel did not exist.
    pub fn delete_channel(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM channels WHERE id = ?1", [id])? > 0))
    }

    // -- Messages --

    pub fn insert_direct_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        text: &str,
        image: Option<&str>,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, text, image) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, sender_id, receiver_id, text, image],
            )?;
            query_message(conn, id)?.ok_or_else(|| anyhow!("Message vanished after insert: {}", id))
        })
    }

    pub fn insert_channel_message(
        &self,
        id: &str,
        sender_id: &str,
        channel_id: &str,
        text: &str,
        image: Option<&str>,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, channel_id, text, image) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![id, sender_id, channel_id, text, image],
            )?;
            query_message(conn, id)?.ok_or_else(|| anyhow!("Message vanished after insert: {}", id))
        })
    }

    /// Personal messages exchanged between two users in either direction, oldest first.
    pub fn get_conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE (m.sender_id = ?1 AND m.receiver_id = ?2)
                    OR (m.sender_id = ?2 AND m.receiver_id = ?1)
                 ORDER BY m.created_at, m.rowid"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((user_a, user_b), message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_channel_messages(&self, channel_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{MESSAGE_SELECT}
                 WHERE m.channel_id = ?1
                 ORDER BY m.created_at, m.rowid"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([channel_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// True when `err` came from a UNIQUE/CHECK/foreign-key constraint, e.g. a
/// second signup racing past the duplicate-email check.
pub fn is_constraint_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation
    )
}

fn insert_members(conn: &Connection, channel_id: &str, member_ids: &[String]) -> Result<()> {
    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO channel_members (channel_id, user_id) VALUES (?1, ?2)")?;
    for member_id in member_ids {
        stmt.execute((channel_id, member_id))?;
    }
    Ok(())
}

fn touch_channel(conn: &Connection, id: &str) -> Result<()> {
    let sql = format!("UPDATE channels SET updated_at = {NOW} WHERE id = ?1");
    conn.execute(&sql, [id])?;
    Ok(())
}

/// Lowercased `%term%` with LIKE metacharacters escaped, for matching
/// against `fold_case(column)`; `None` for a blank term.
fn like_pattern(search: Option<&str>) -> Option<String> {
    let term = search.map(str::trim).filter(|t| !t.is_empty())?.to_lowercase();
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    Some(pattern)
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(", ")
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    // `column` is always one of our own literals, never caller input
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

fn query_channel(conn: &Connection, id: &str) -> Result<Option<ChannelRow>> {
    let sql = format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([id], channel_from_row).optional()?;
    Ok(row)
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let sql = format!("{MESSAGE_SELECT} WHERE m.id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([id], message_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        profile_pic: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn channel_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        name: row.get(1)?,
        creator_id: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_name: row
            .get::<_, Option<String>>(2)?
            .unwrap_or_else(|| "unknown".to_string()),
        receiver_id: row.get(3)?,
        channel_id: row.get(4)?,
        text: row.get(5)?,
        image: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
