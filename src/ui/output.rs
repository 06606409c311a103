use crate::cache::FlushReport;
use crate::commands::Reply;
use crate::money::format_money;
use crate::shutdown::ShutdownOutcome;
use crate::ui::{Icons, theme};
use crate::user::UserRow;
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::ROCKET, text.style(theme().header.clone()));
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().error.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn info(label: &str, value: &str) {
    println!(
        "{} {}: {}",
        Icons::INFO,
        label.style(theme().header.clone()),
        value
    );
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

pub fn reply(reply: &Reply) {
    println!("{}", format_reply(reply));
}

fn money(amount: f64) -> String {
    format!("${}", format_money(amount))
        .style(theme().money.clone())
        .to_string()
}

fn who(user: &UserRow) -> String {
    format!("{} ({})", user.name, user.id)
}

pub fn format_reply(reply: &Reply) -> String {
    match reply {
        Reply::Message { user, levelled_up: true } => format!(
            "{} {} reached {}",
            Icons::UP,
            who(user),
            format!("level {}", user.level).style(theme().level.clone())
        ),
        Reply::Message { user, levelled_up: false } => format!(
            "{} {} messages: {}",
            Icons::PERSON,
            who(user),
            user.message_count
        ),
        Reply::Balance(user) => format!("{} {} {}", Icons::MONEY, who(user), money(user.money)),
        Reply::Level { user, next_level_at } => {
            let progress = match next_level_at {
                Some(required) => format!("{}/{} messages", user.message_count, required),
                None => format!("{} messages, max level", user.message_count),
            };
            format!(
                "{} {} {} · {}",
                Icons::STAR,
                who(user),
                format!("level {}", user.level).style(theme().level.clone()),
                progress
            )
        }
        Reply::Transferred { from, to, amount } => format!(
            "{} {} {} {} · balances {} / {}",
            Icons::RIGHT,
            who(from),
            money(*amount),
            who(to),
            money(from.money),
            money(to.money)
        ),
        Reply::MoneySet(user) => format!("{} Set {} to {}", Icons::MONEY, who(user), money(user.money)),
        Reply::Prestige(user) => format!("{} {} prestige {}", Icons::TROPHY, who(user), user.prestige),
        Reply::Flushed(report) => format!("{} {}", Icons::SAVE, format_flush(report)),
    }
}

pub fn format_flush(report: &FlushReport) -> String {
    if report.failed > 0 {
        format!("saved {}, failed {}", report.saved, report.failed)
    } else {
        format!("saved {}", report.saved)
    }
}

pub fn shutdown_outcome(outcome: &ShutdownOutcome) {
    match outcome {
        ShutdownOutcome::Completed(report) if report.failed == 0 => {
            success(&format!("All users saved ({})", format_flush(report)));
        }
        ShutdownOutcome::Completed(report) => {
            warn(&format!("Some users were not saved ({})", format_flush(report)));
        }
        ShutdownOutcome::TimedOut => warn("Final save timed out"),
        ShutdownOutcome::Failed(reason) => error(&format!("Final save failed: {reason}")),
        ShutdownOutcome::AlreadyFlushed => {}
    }
}

pub fn profile(user: &UserRow) {
    section(&who(user));
    info("Money", &money(user.money));
    info("Level", &user.level.to_string());
    info("Messages", &user.message_count.to_string());
    info("Prestige", &user.prestige.to_string());
}
