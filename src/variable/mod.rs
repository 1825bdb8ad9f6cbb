use self::handles::Handles;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};

pub mod handles;
mod parser;

pub use parser::{IndentRules, VariableParser};

pub const STRING_TYPE: &str = "Lang.String";
pub const ARRAY_TYPE: &str = "Lang.Array";
pub const DICTIONARY_TYPE: &str = "Lang.Dictionary";
pub const UNDEFINED_TYPE: &str = "undefined";
pub const NULL_VALUE: &str = "null";

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variable {
    pub name: String,
    pub value: Option<String>,
    #[serde(rename = "type")]
    pub type_field: Option<String>,
    /// `0` for leaves, otherwise a handle for `Session::child_variables`.
    pub reference: usize,
    pub children: Vec<Variable>,
}

impl Variable {
    pub fn leaf(name: impl Into<String>, value: impl Into<String>, type_field: Option<String>) -> Self {
        Variable {
            name: name.into(),
            value: Some(value.into()),
            type_field,
            reference: 0,
            children: vec![],
        }
    }
    pub fn null(name: impl Into<String>) -> Self {
        Self::leaf(name, NULL_VALUE, Some(UNDEFINED_TYPE.to_string()))
    }

    pub fn is_container(&self) -> bool {
        self.reference != 0
    }

    /// Depth-first search for the node carrying `reference`.
    pub fn find_reference(variables: &[Variable], reference: usize) -> Option<&Variable> {
        variables.iter().find_map(|variable| {
            if variable.reference == reference {
                Some(variable)
            } else {
                Self::find_reference(&variable.children, reference)
            }
        })
    }

    /// Depth-first search for the first node named `name`.
    pub fn find_name<'v>(variables: &'v [Variable], name: &str) -> Option<&'v Variable> {
        variables.iter().find_map(|variable| {
            if variable.name == name {
                Some(variable)
            } else {
                Self::find_name(&variable.children, name)
            }
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VariableScope {
    Locals,
    Arguments,
    Globals,
}

/// Where a container lives in the cached trees of the current suspend cycle.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct VariablePath {
    pub scope: VariableScope,
    pub segments: Vec<String>,
}

impl VariablePath {
    pub fn root(scope: VariableScope, name: impl Into<String>) -> Self {
        VariablePath {
            scope,
            segments: vec![name.into()],
        }
    }
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(name.into());
        VariablePath {
            scope: self.scope,
            segments,
        }
    }
}

impl Display for VariablePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}:{}", self.scope, self.segments.join("."))
    }
}

pub type VariableHandles = Handles<VariablePath>;

/// One `name = value` line of an `info frame` / `info variables` listing.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ListingEntry {
    pub name: String,
    pub value: String,
}

impl ListingEntry {
    pub fn is_null(&self) -> bool {
        self.value == NULL_VALUE
    }

    /// The listing line alone, used when the variable could not be printed.
    pub fn to_leaf(&self) -> Variable {
        if self.is_null() {
            return Variable::null(&self.name);
        }
        match parser::split_typed_value(&self.value) {
            Some((value, type_field)) => {
                Variable::leaf(&self.name, value, Some(type_field.to_string()))
            }
            None => Variable::leaf(&self.name, &self.value, None),
        }
    }
}

lazy_static! {
    static ref LISTING_LINE: Regex = Regex::new(r"^(\S+) = (.*)$").unwrap();
}

pub fn parse_listing(text: &str) -> Vec<ListingEntry> {
    text.lines()
        .filter_map(|line| {
            let captures = LISTING_LINE.captures(line.trim())?;
            Some(ListingEntry {
                name: captures[1].to_string(),
                value: captures[2].trim().to_string(),
            })
        })
        .collect()
}

/// The `Args:` section of an `info frame` frame.
pub fn arguments_section(frame: &str) -> Option<&str> {
    let start = frame.find(crate::markers::ARGS)? + crate::markers::ARGS.len();
    let rest = &frame[start..];
    let end = [crate::markers::LOCALS, crate::markers::NO_LOCALS]
        .iter()
        .filter_map(|marker| rest.find(marker))
        .min()
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// The `Locals:` section of an `info frame` frame.
pub fn locals_section(frame: &str) -> Option<&str> {
    let start = frame.find(crate::markers::LOCALS)? + crate::markers::LOCALS.len();
    Some(&frame[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO_FRAME: &str = "Args:\r\n  self = 0x00000010 (MyApp.View)\r\n  dc = 0x00000011 (Graphics.Dc)\r\n\
        Locals:\r\n  count = 5 (Lang.Number)\r\n  nothing = null\r\n";

    #[test]
    fn test_sections() {
        let arguments = parse_listing(arguments_section(INFO_FRAME).unwrap());
        assert_eq!(
            arguments.iter().map(|it| it.name.as_str()).collect::<Vec<_>>(),
            vec!["self", "dc"],
        );
        let locals = parse_listing(locals_section(INFO_FRAME).unwrap());
        assert_eq!(locals.len(), 2);
        assert_eq!(locals[0].to_leaf(), Variable::leaf("count", "5", Some("Lang.Number".to_string())));
        assert_eq!(locals[1].to_leaf(), Variable::null("nothing"));

        assert_eq!(locals_section("Args:\r\n  a = 1 (Lang.Number)\r\nNo locals."), None);
        assert_eq!(
            parse_listing(arguments_section("Args:\r\n  a = 1 (Lang.Number)\r\nNo locals.").unwrap()).len(),
            1,
        );
    }

    #[test]
    fn test_find_reference() {
        let tree = vec![Variable {
            name: "obj".to_string(),
            value: Some("0x12".to_string()),
            type_field: Some("MyApp.Foo".to_string()),
            reference: 1,
            children: vec![Variable {
                name: "inner".to_string(),
                value: Some("0x13".to_string()),
                type_field: Some("MyApp.Bar".to_string()),
                reference: 2,
                children: vec![Variable::leaf("flag", "true", None)],
            }],
        }];
        assert_eq!(Variable::find_reference(&tree, 2).unwrap().name, "inner");
        assert_eq!(Variable::find_reference(&tree, 3), None);
        assert_eq!(Variable::find_name(&tree, "flag").unwrap().value.as_deref(), Some("true"));
    }
}
