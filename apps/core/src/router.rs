use std::collections::BTreeMap;

use crate::model::ProviderId;
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Registration indices, in registry order.
    pub selected: Vec<usize>,
    pub providers: Vec<ProviderId>,
    pub prefix: Option<String>,
    pub residual: String,
}

impl Route {
    pub fn is_default(&self) -> bool {
        self.prefix.is_none()
    }
}

/// Static exact-match prefix table built once from the registry.
#[derive(Debug, Clone)]
pub struct PrefixRouter {
    table: BTreeMap<String, usize>,
    default_set: Vec<usize>,
    calculator: Option<usize>,
    ids: Vec<ProviderId>,
}

impl PrefixRouter {
    pub fn new(registry: &Registry) -> Self {
        let mut table = BTreeMap::new();
        let mut default_set = Vec::new();
        let mut default_ids: Vec<ProviderId> = Vec::new();
        let ids: Vec<ProviderId> = registry.entries().iter().map(|e| e.id()).collect();

        for (index, entry) in registry.entries().iter().enumerate() {
            match entry.prefix.as_deref() {
                Some(prefix) => {
                    table.entry(prefix.to_string()).or_insert(index);
                }
                None => {
                    if !default_ids.contains(&ids[index]) {
                        default_ids.push(ids[index].clone());
                        default_set.push(index);
                    }
                }
            }
        }

        let calculator = ids.iter().position(|id| *id == ProviderId::Calculator);
        Self {
            table,
            default_set,
            calculator,
            ids,
        }
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }

    pub fn route(&self, raw: &str) -> Route {
        let (token, rest) = match raw.find(char::is_whitespace) {
            Some(split) => raw.split_at(split),
            None => (raw, ""),
        };

        if let Some(&index) = self.table.get(token) {
            return Route {
                selected: vec![index],
                providers: vec![self.ids[index].clone()],
                prefix: Some(token.to_string()),
                residual: strip_one_separator(rest).to_string(),
            };
        }

        let mut selected = self.default_set.clone();
        if let Some(calculator) = self.calculator {
            let already = selected.iter().any(|&i| self.ids[i] == ProviderId::Calculator);
            if !already && is_arithmetic(raw) {
                selected.push(calculator);
                selected.sort_unstable();
            }
        }
        Route {
            providers: selected.iter().map(|&i| self.ids[i].clone()).collect(),
            selected,
            prefix: None,
            residual: raw.to_string(),
        }
    }
}

fn strip_one_separator(rest: &str) -> &str {
    let mut chars = rest.chars();
    match chars.next() {
        Some(c) if c.is_whitespace() => chars.as_str(),
        _ => rest,
    }
}

/// True for input like `2 + 3 * (4 - 1)`: only digits, whitespace, `.`,
/// operators and parentheses, with at least one digit and one binary operator.
pub fn is_arithmetic(input: &str) -> bool {
    let mut has_digit = false;
    let mut has_binary_operator = false;
    let mut previous: Option<char> = None;

    for c in input.chars() {
        if c.is_whitespace() {
            continue;
        }
        match c {
            '0'..='9' => has_digit = true,
            '.' | '(' | ')' => {}
            '+' | '-' | '*' | '/' | '%' | '^' => {
                if previous.is_some_and(|p| p.is_ascii_digit() || p == ')' || p == '.') {
                    has_binary_operator = true;
                }
            }
            _ => return false,
        }
        previous = Some(c);
    }
    has_digit && has_binary_operator
}
