use serde::{Deserialize, Serialize};

use super::{Rule, RuleError, RuleKind};

/// Ordered collection of rules.
///
/// Order is significant: the target tool evaluates rules in file order, so
/// every operation keeps it unless the caller reorders explicitly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn as_slice(&self) -> &[Rule] {
        &self.rules
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name() == name)
    }

    pub fn get_mut_at(&mut self, index: usize) -> Option<&mut Rule> {
        self.rules.get_mut(index)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Append a rule, rejecting a name that is already taken.
    pub fn push(&mut self, rule: Rule) -> Result<(), RuleError> {
        if self.contains(rule.name()) {
            return Err(RuleError::DuplicateName {
                name: rule.name().to_string(),
            });
        }
        self.rules.push(rule);
        Ok(())
    }

    /// Append a rule, or replace a rule of the same name where it stands.
    /// Returns the replaced rule.
    pub fn insert_or_replace(&mut self, rule: Rule) -> Option<Rule> {
        match self.position(rule.name()) {
            Some(index) => Some(std::mem::replace(&mut self.rules[index], rule)),
            None => {
                self.rules.push(rule);
                None
            }
        }
    }

    pub fn of_kind(&self, kind: RuleKind) -> impl Iterator<Item = &Rule> {
        self.rules.iter().filter(move |r| r.kind() == kind)
    }

    /// Priority for a rule appended after every existing rule.
    pub fn next_priority(&self) -> u32 {
        self.rules.iter().map(|r| r.priority).max().unwrap_or(0) + 1
    }

    /// Move the rule at `from` to `to`, shifting the rules in between.
    /// Priorities are renumbered to follow the new order.
    pub fn move_rule(&mut self, from: usize, to: usize) -> bool {
        if from >= self.rules.len() || to >= self.rules.len() {
            return false;
        }
        let rule = self.rules.remove(from);
        self.rules.insert(to, rule);
        self.renumber_priorities();
        true
    }

    /// Reassign priorities 1..=n in current order.
    pub fn renumber_priorities(&mut self) {
        for (index, rule) in self.rules.iter_mut().enumerate() {
            rule.priority = index as u32 + 1;
        }
    }

    /// Rules sorted by precedence (priority, then file order).
    pub fn by_precedence(&self) -> Vec<&Rule> {
        let mut ordered: Vec<&Rule> = self.rules.iter().collect();
        ordered.sort_by_key(|r| r.priority);
        ordered
    }
}

impl FromIterator<Rule> for RuleSet {
    /// Collects without a uniqueness check; later duplicates replace
    /// earlier ones in place.
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        let mut set = RuleSet::new();
        for rule in iter {
            set.insert_or_replace(rule);
        }
        set
    }
}

impl IntoIterator for RuleSet {
    type Item = Rule;
    type IntoIter = std::vec::IntoIter<Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.into_iter()
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
