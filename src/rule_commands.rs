//! `tidyflow rules ...`

use clap::{Subcommand, ValueEnum};
use colored::Colorize;

use tidyflow::model::ActionType;
use tidyflow::rules::{LogicalOperator, Rule, RuleCondition, RuleDraft, RuleEngine};
use tidyflow::Organizer;

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ActionArg {
    Move,
    Copy,
    Delete,
}

impl From<ActionArg> for ActionType {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Move => ActionType::Move,
            ActionArg::Copy => ActionType::Copy,
            ActionArg::Delete => ActionType::Delete,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum RulesCommand {
    /// Show rules in evaluation order
    List,
    /// Add a rule. Conditions combine with AND unless --any is given
    Add {
        name: String,
        /// Extension to match, without the dot
        #[arg(long = "ext")]
        extensions: Vec<String>,
        #[arg(long)]
        contains: Vec<String>,
        #[arg(long)]
        starts_with: Vec<String>,
        #[arg(long)]
        ends_with: Vec<String>,
        /// e.g. 100MB
        #[arg(long)]
        larger_than: Option<String>,
        #[arg(long)]
        smaller_than: Option<String>,
        /// Created more than N days ago
        #[arg(long)]
        older_than: Option<i64>,
        #[arg(long)]
        modified_before: Option<i64>,
        #[arg(long)]
        opened_before: Option<i64>,
        /// Match when any condition holds
        #[arg(long)]
        any: bool,
        #[arg(long, value_enum, default_value = "move")]
        action: ActionArg,
        /// Destination relative to the root
        #[arg(long)]
        to: Option<String>,
        #[arg(long, default_value_t = 0)]
        priority: i32,
        #[arg(long)]
        disabled: bool,
    },
    /// Remove a rule by id or unique id prefix
    Remove { id: String },
}

pub fn run(cmd: RulesCommand, organizer: &Organizer) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        RulesCommand::List => list(organizer),
        RulesCommand::Add {
            name,
            extensions,
            contains,
            starts_with,
            ends_with,
            larger_than,
            smaller_than,
            older_than,
            modified_before,
            opened_before,
            any,
            action,
            to,
            priority,
            disabled,
        } => {
            let mut conditions: Vec<RuleCondition> = Vec::new();
            conditions.extend(extensions.into_iter().map(RuleCondition::ExtensionEquals));
            conditions.extend(contains.into_iter().map(RuleCondition::NameContains));
            conditions.extend(starts_with.into_iter().map(RuleCondition::NameStartsWith));
            conditions.extend(ends_with.into_iter().map(RuleCondition::NameEndsWith));
            conditions.extend(larger_than.map(RuleCondition::SizeGreaterThan));
            conditions.extend(smaller_than.map(RuleCondition::SizeLessThan));
            conditions.extend(older_than.map(RuleCondition::DateOlderThan));
            conditions.extend(modified_before.map(RuleCondition::ModifiedOlderThan));
            conditions.extend(opened_before.map(RuleCondition::AccessedOlderThan));

            let rule = organizer.add_rule(RuleDraft {
                name,
                conditions,
                logical_operator: if any {
                    LogicalOperator::Or
                } else {
                    LogicalOperator::And
                },
                action: action.into(),
                destination: to,
                priority,
                enabled: !disabled,
            })?;
            println!("{} Added rule {}", "✓".green(), describe(&rule));
            Ok(())
        }
        RulesCommand::Remove { id } => {
            let rules = organizer.rules()?;
            let matches: Vec<&Rule> = rules
                .iter()
                .filter(|r| r.id.to_string().starts_with(id.trim()))
                .collect();
            match matches.as_slice() {
                [rule] => {
                    let removed = organizer.remove_rule(rule.id)?;
                    println!("{} Removed rule '{}'", "✓".green(), removed.name);
                    Ok(())
                }
                [] => Err(format!("no rule matches '{}'", id).into()),
                _ => Err(format!(
                    "'{}' matches {} rules; use more of the id",
                    id,
                    matches.len()
                )
                .into()),
            }
        }
    }
}

fn list(organizer: &Organizer) -> Result<(), Box<dyn std::error::Error>> {
    let rules = organizer.rules()?;
    if rules.is_empty() {
        println!("{} No rules yet. Add one with `tidyflow rules add`.", "○".dimmed());
        return Ok(());
    }
    for rule in RuleEngine::ordered(&rules) {
        println!("{} {}", "●".green(), describe(rule));
    }
    for rule in rules.iter().filter(|r| !r.enabled) {
        println!("{} {} {}", "○".dimmed(), describe(rule), "(disabled)".dimmed());
    }
    Ok(())
}

fn describe(rule: &Rule) -> String {
    let joiner = match rule.logical_operator {
        LogicalOperator::And => " and ",
        LogicalOperator::Or => " or ",
    };
    let conditions: Vec<String> = rule.conditions.iter().map(RuleCondition::describe).collect();
    let target = match (&rule.action, &rule.destination) {
        (ActionType::Delete, _) => "delete".red().to_string(),
        (action, Some(dest)) => format!("{} to {}", action, dest.cyan()),
        (action, None) => action.to_string(),
    };
    format!(
        "{} '{}' [p{}]: {} -> {}",
        rule.id.to_string()[..8].dimmed(),
        rule.name.bold(),
        rule.priority,
        conditions.join(joiner),
        target
    )
}
