//! CLI command definitions and argument parsing.
//!
//! Uses clap derive macros for ergonomic argument definitions.

pub mod args;

use colored::Colorize;

use prchat::models::{Role, Turn};

/// Render one stored turn for terminal output.
pub fn render_turn(index: usize, turn: &Turn) -> String {
    let name = turn.role.to_string();
    let role = match turn.role {
        Role::User => name.cyan().bold(),
        Role::Assistant => name.green().bold(),
        Role::Diffs => name.yellow().bold(),
    };
    let when = turn.timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string();
    format!("{} {role} {}\n{}\n", format!("#{index}").dimmed(), when.dimmed(), turn.text)
}
