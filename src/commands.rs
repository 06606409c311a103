//! Chat command layer
//!
//! Turns one line of chat-style input into a [`ChatCommand`] and applies it
//! to the cache. Users are written as `<id>` or `<id>:<name>`; the name only
//! matters the first time an id is seen.

use std::str::FromStr;

use crate::cache::{FlushReport, UserCache};
use crate::money::parse_amount;
use crate::user::{self, UserRow, messages_for_next_level};
use crate::{Error, Result};

/// A user reference as typed in a command
#[derive(Debug, Clone, PartialEq)]
pub struct UserRef {
    pub id: i64,
    pub name: String,
}

impl FromStr for UserRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (id_str, name) = match s.split_once(':') {
            Some((id, name)) if !name.is_empty() => (id, Some(name)),
            Some(_) => return Err(Error::InvalidInput(format!("empty name in {s:?}"))),
            None => (s, None),
        };

        let id: i64 = id_str
            .parse()
            .map_err(|_| Error::InvalidInput(format!("invalid user id: {id_str:?}")))?;

        Ok(Self {
            id,
            name: name.map(str::to_string).unwrap_or_else(|| id.to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// A chat message was received from this user
    Message(UserRef),
    Balance(UserRef),
    Level(UserRef),
    Give { from: UserRef, to: UserRef, amount: f64 },
    SetMoney { user: UserRef, amount: f64 },
    Prestige(UserRef),
    Flush,
}

/// What a command did, for display
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Message { user: UserRow, levelled_up: bool },
    Balance(UserRow),
    /// `next_level_at` is `None` when no further level is reachable
    Level { user: UserRow, next_level_at: Option<u64> },
    Transferred { from: UserRow, to: UserRow, amount: f64 },
    MoneySet(UserRow),
    Prestige(UserRow),
    Flushed(FlushReport),
}

impl FromStr for ChatCommand {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let args: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, rest)) = args.split_first() else {
            return Err(Error::InvalidInput("empty command".to_string()));
        };

        let verb = verb.trim_start_matches('$').to_ascii_lowercase();
        match (verb.as_str(), rest) {
            ("message" | "msg", [user]) => Ok(Self::Message(user.parse()?)),
            ("balance" | "bal", [user]) => Ok(Self::Balance(user.parse()?)),
            ("level" | "lvl", [user]) => Ok(Self::Level(user.parse()?)),
            ("give", [from, to, amount]) => Ok(Self::Give {
                from: from.parse()?,
                to: to.parse()?,
                amount: parse_amount(amount)?,
            }),
            ("setmoney", [user, amount]) => Ok(Self::SetMoney {
                user: user.parse()?,
                amount: parse_amount(amount)?,
            }),
            ("prestige", [user]) => Ok(Self::Prestige(user.parse()?)),
            ("flush", []) => Ok(Self::Flush),
            ("message" | "msg" | "balance" | "bal" | "level" | "lvl" | "give" | "setmoney"
            | "prestige" | "flush", _) => Err(Error::InvalidInput(format!(
                "wrong number of arguments for {verb}"
            ))),
            _ => Err(Error::InvalidInput(format!("unknown command: {verb}"))),
        }
    }
}

impl ChatCommand {
    pub fn apply(&self, cache: &UserCache) -> Result<Reply> {
        match self {
            Self::Message(who) => {
                let user = cache.get_or_create(who.id, &who.name)?;
                let mut guard = user.lock();
                let levelled_up = guard.record_message();
                Ok(Reply::Message {
                    user: guard.to_row(),
                    levelled_up,
                })
            }
            Self::Balance(who) => {
                let user = cache.get_or_create(who.id, &who.name)?;
                Ok(Reply::Balance(user.snapshot()))
            }
            Self::Level(who) => {
                let row = cache.get_or_create(who.id, &who.name)?.snapshot();
                let next_level_at = messages_for_next_level(row.level);
                Ok(Reply::Level {
                    user: row,
                    next_level_at,
                })
            }
            Self::Give { from, to, amount } => {
                let source = cache.get_or_create(from.id, &from.name)?;
                let target = cache.get_or_create(to.id, &to.name)?;
                user::transfer(&source, &target, *amount)?;
                Ok(Reply::Transferred {
                    from: source.snapshot(),
                    to: target.snapshot(),
                    amount: *amount,
                })
            }
            Self::SetMoney { user, amount } => {
                let record = cache.get_or_create(user.id, &user.name)?;
                let mut guard = record.lock();
                guard.set_money(*amount)?;
                Ok(Reply::MoneySet(guard.to_row()))
            }
            Self::Prestige(who) => {
                let user = cache.get_or_create(who.id, &who.name)?;
                let mut guard = user.lock();
                guard.add_prestige(1);
                Ok(Reply::Prestige(guard.to_row()))
            }
            Self::Flush => Ok(Reply::Flushed(cache.flush_dirty())),
        }
    }
}
