use tabled::{Table, Tabled, settings::Style};

use crate::money::format_money;
use crate::user::UserRow;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Tabled)]
struct LeaderboardRow {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "User")]
    name: String,
    #[tabled(rename = "Money")]
    money: String,
    #[tabled(rename = "Level")]
    level: u32,
    #[tabled(rename = "Messages")]
    messages: u64,
}

#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

pub fn stats_table(stats: &[(&str, &str)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

pub fn leaderboard_table(users: &[UserRow]) -> String {
    if users.is_empty() {
        return String::new();
    }

    let rows: Vec<LeaderboardRow> = users
        .iter()
        .enumerate()
        .map(|(i, u)| LeaderboardRow {
            rank: i + 1,
            name: u.name.clone(),
            money: format!("${}", format_money(u.money)),
            level: u.level,
            messages: u.message_count,
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaderboard_ranks_in_order() {
        let users = vec![
            UserRow { money: 5000.0, ..UserRow::new(1, "rich") },
            UserRow { money: 10.0, ..UserRow::new(2, "poor") },
        ];
        let table = leaderboard_table(&users);
        let rich = table.find("rich").unwrap();
        let poor = table.find("poor").unwrap();
        assert!(rich < poor);
        assert!(table.contains("$5,000"));
    }

    #[test]
    fn test_empty_tables_render_nothing() {
        assert!(leaderboard_table(&[]).is_empty());
        assert!(stats_table(&[]).is_empty());
    }
}
