use super::{
    Variable, VariableHandles, VariablePath, ARRAY_TYPE, DICTIONARY_TYPE, NULL_VALUE,
    STRING_TYPE, UNDEFINED_TYPE,
};
use crate::markers;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

const DICT_ENTRY: &str = "dict_entry";
const KEY_VALUE_SEPARATOR: &str = "=>";

/// How far the children of a container are indented relative to its header.
///
/// `mdd` nests the index and key lines of arrays and dictionaries one level
/// deeper than the fields of plain objects.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndentRules {
    pub object: usize,
    pub collection: usize,
}
impl Default for IndentRules {
    fn default() -> Self {
        IndentRules {
            object: 2,
            collection: 4,
        }
    }
}
impl IndentRules {
    fn delta_for(&self, type_field: &str) -> usize {
        if is_collection(type_field) {
            self.collection
        } else {
            self.object
        }
    }
}

fn is_collection(type_field: &str) -> bool {
    type_field.contains(ARRAY_TYPE) || type_field.contains(DICTIONARY_TYPE)
}

lazy_static! {
    static ref HEADER: Regex = Regex::new(r"^(\S+) =$").unwrap();
    static ref ASSIGNMENT: Regex =
        Regex::new(r"^(\S+) = (.+?)(?: \(([^()]*)\))?,?$").unwrap();
    static ref TYPED_VALUE: Regex = Regex::new(r"^(.+?) \(([^()]*)\),?$").unwrap();
    static ref NULL_ENTRY: Regex = Regex::new(r"^null,?$").unwrap();
}

/// Splits `0x12 (MyApp.Foo)` into its value and type.
pub(super) fn split_typed_value(text: &str) -> Option<(&str, &str)> {
    let captures = TYPED_VALUE.captures(text.trim())?;
    let (value, type_field) = (captures.get(1)?, captures.get(2)?);
    Some((value.as_str(), type_field.as_str()))
}

/// `[3]` → `3`
fn clean_name(name: &str) -> String {
    name.trim_start_matches('[').trim_end_matches(']').to_string()
}

fn is_punctuation(trimmed: &str) -> bool {
    matches!(trimmed, "[" | "]" | "]," | "{" | "}" | "}," | ",")
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn strip_trailing_comma(text: &str) -> &str {
    text.strip_suffix(',').unwrap_or(text)
}

enum Line<'a> {
    /// `name =`, the value and type follow on the next line.
    Header { name: &'a str },
    /// `name = value (Type)` or `name = null`
    Assignment {
        name: &'a str,
        value: &'a str,
        type_field: Option<&'a str>,
    },
    /// `value (Type)` inside a dictionary, `<value> (Type)` for containers.
    Entry { value: &'a str, type_field: &'a str },
    NullEntry,
    Unknown,
}

fn classify(trimmed: &str) -> Line<'_> {
    if let Some(captures) = HEADER.captures(trimmed) {
        return Line::Header {
            name: captures.get(1).map_or("", |it| it.as_str()),
        };
    }
    if let Some(captures) = ASSIGNMENT.captures(trimmed) {
        return Line::Assignment {
            name: captures.get(1).map_or("", |it| it.as_str()),
            value: captures.get(2).map_or("", |it| it.as_str()),
            type_field: captures.get(3).map(|it| it.as_str()),
        };
    }
    if NULL_ENTRY.is_match(trimmed) {
        return Line::NullEntry;
    }
    if let Some((value, type_field)) = split_typed_value(trimmed) {
        return Line::Entry { value, type_field };
    }
    Line::Unknown
}

/// Position in the lines of one frame, shared by all recursion levels.
struct Cursor<'a> {
    lines: Vec<&'a str>,
    position: usize,
}
impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Cursor {
            lines: text.lines().collect(),
            position: 0,
        }
    }
    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.position).copied()
    }
    fn advance(&mut self) {
        self.position += 1;
    }
    fn next(&mut self) -> Option<&'a str> {
        let line = self.peek()?;
        self.advance();
        Some(line)
    }
    /// Indentation of the next line that carries data, without consuming it.
    fn next_data_indentation(&self) -> Option<usize> {
        self.lines[self.position.min(self.lines.len())..]
            .iter()
            .find(|line| {
                let trimmed = line.trim();
                !trimmed.is_empty() && !is_punctuation(trimmed) && trimmed != KEY_VALUE_SEPARATOR
            })
            .map(|line| indentation(line))
    }
}

/// Rebuilds variable trees from the output of `print <name>`.
pub struct VariableParser<'h> {
    handles: &'h mut VariableHandles,
    rules: IndentRules,
}

impl<'h> VariableParser<'h> {
    pub fn new(handles: &'h mut VariableHandles, rules: IndentRules) -> Self {
        VariableParser { handles, rules }
    }

    /// Returns `None` if the debugger does not know the symbol.
    pub fn parse_print_output(&mut self, frame: &str, path: VariablePath) -> Option<Variable> {
        let name = path.segments.last().cloned().unwrap_or_default();
        if markers::is_no_symbol_for(frame, &name) {
            return None;
        }
        let mut cursor = Cursor::new(frame);
        let header = loop {
            let line = cursor.next()?;
            if !line.trim().is_empty() {
                break line;
            }
        };
        let header_indentation = indentation(header);

        let (value, type_field) = match classify(header.trim()) {
            Line::Assignment {
                value, type_field, ..
            } => {
                if value == NULL_VALUE {
                    return Some(Variable::null(name));
                }
                (value.to_string(), type_field.map(str::to_string))
            }
            Line::Header { .. } => match cursor.next().and_then(split_typed_value) {
                Some((value, type_field)) => (value.to_string(), Some(type_field.to_string())),
                None => return Some(Variable::leaf(name, "", None)),
            },
            _ => {
                debug!("Unexpected print output header: {header:?}");
                return None;
            }
        };

        let Some(type_name) = type_field.clone() else {
            return Some(Variable::leaf(name, value, None));
        };
        if type_name == STRING_TYPE {
            let text = cursor
                .lines
                .iter()
                .skip(cursor.position)
                .find(|it| !it.trim().is_empty())
                .map(|it| strip_trailing_comma(it.trim()).to_string());
            return Some(Variable::leaf(name, text.unwrap_or(value), type_field));
        }
        let has_more_lines = cursor.lines[cursor.position..]
            .iter()
            .any(|it| !it.trim().is_empty());
        if !has_more_lines && !is_collection(&type_name) {
            return Some(Variable::leaf(name, value, type_field));
        }

        let level = self.child_level(&cursor, header_indentation, &type_name);
        let children = self.parse_children(&mut cursor, level, &path);
        Some(Variable {
            name,
            value: Some(value),
            type_field,
            reference: self.handles.create(path).get(),
            children,
        })
    }

    /// The configured indentation, unless the first child says otherwise.
    fn child_level(&self, cursor: &Cursor, header_indentation: usize, type_field: &str) -> usize {
        let expected = header_indentation + self.rules.delta_for(type_field);
        match cursor.next_data_indentation() {
            Some(actual) if actual > header_indentation && actual != expected => {
                debug!("Children of a {type_field} are indented by {actual}, expected {expected}.");
                actual
            }
            _ => expected,
        }
    }

    fn parse_children(
        &mut self,
        cursor: &mut Cursor,
        level: usize,
        path: &VariablePath,
    ) -> Vec<Variable> {
        let mut children = vec![];
        let mut is_key_value_pair = false;

        while let Some(line) = cursor.peek() {
            let trimmed = line.trim();
            if trimmed.is_empty() || is_punctuation(trimmed) {
                cursor.advance();
                continue;
            }

            let current = indentation(line);
            if current < level {
                break;
            }
            if trimmed == KEY_VALUE_SEPARATOR {
                is_key_value_pair = true;
                cursor.advance();
                continue;
            }
            if current > level {
                trace!("Skipping unexpected line {trimmed:?} (indentation {current}, level {level}).");
                cursor.advance();
                continue;
            }

            cursor.advance();
            match classify(trimmed) {
                Line::Header { name } => {
                    let name = clean_name(name);
                    let child_path = path.child(&name);
                    children.push(self.parse_nested(cursor, name, current, child_path));
                }
                Line::Assignment {
                    name,
                    value,
                    type_field,
                } => {
                    let name = clean_name(name);
                    children.push(if value == NULL_VALUE {
                        Variable::null(name)
                    } else {
                        Variable::leaf(name, value, type_field.map(str::to_string))
                    });
                }
                Line::Entry { value, type_field } => {
                    let entry = if value.starts_with('<') && value.ends_with('>') {
                        let child_path = path.child(format!("{DICT_ENTRY}{}", children.len()));
                        self.parse_container_entry(cursor, value, type_field, current, child_path)
                    } else {
                        Variable::leaf(DICT_ENTRY, value, Some(type_field.to_string()))
                    };
                    children.push(entry);
                }
                Line::NullEntry => children.push(Variable::leaf(
                    DICT_ENTRY,
                    NULL_VALUE,
                    Some(UNDEFINED_TYPE.to_string()),
                )),
                Line::Unknown => {
                    trace!("Skipping unrecognized line {trimmed:?}.");
                    continue;
                }
            }

            if is_key_value_pair
                && children.iter().filter(|it| it.name == DICT_ENTRY).count() == 2
            {
                self.coalesce_pair(&mut children, path);
                is_key_value_pair = false;
            }
        }
        children
    }

    /// A `name =` header followed by a `value (Type)` line.
    fn parse_nested(
        &mut self,
        cursor: &mut Cursor,
        name: String,
        header_indentation: usize,
        path: VariablePath,
    ) -> Variable {
        let Some((value, type_field)) = cursor.peek().and_then(split_typed_value) else {
            debug!("Header `{name} =` is not followed by a type line.");
            return Variable {
                name,
                value: None,
                type_field: None,
                reference: 0,
                children: vec![],
            };
        };
        cursor.advance();

        if type_field == STRING_TYPE {
            let text = cursor.next().map(|it| strip_trailing_comma(it.trim()));
            return Variable::leaf(name, text.unwrap_or(value), Some(type_field.to_string()));
        }

        let level = self.child_level(cursor, header_indentation, type_field);
        let children = self.parse_children(cursor, level, &path);
        Variable {
            name,
            value: Some(value.to_string()),
            type_field: Some(type_field.to_string()),
            reference: self.handles.create(path).get(),
            children,
        }
    }

    /// A dictionary entry that is itself a container, such as `<0x61> (Lang.Array)`.
    fn parse_container_entry(
        &mut self,
        cursor: &mut Cursor,
        value: &str,
        type_field: &str,
        entry_indentation: usize,
        path: VariablePath,
    ) -> Variable {
        if type_field == STRING_TYPE {
            let text = cursor.next().map(|it| strip_trailing_comma(it.trim()));
            return Variable::leaf(DICT_ENTRY, text.unwrap_or(value), Some(type_field.to_string()));
        }
        let level = self.child_level(cursor, entry_indentation, type_field);
        let children = self.parse_children(cursor, level, &path);
        Variable {
            name: DICT_ENTRY.to_string(),
            value: Some(value.to_string()),
            type_field: Some(type_field.to_string()),
            reference: self.handles.create(path).get(),
            children,
        }
    }

    /// Replaces the two trailing `dict_entry` nodes by one `{key, value}` node.
    fn coalesce_pair(&mut self, children: &mut Vec<Variable>, path: &VariablePath) {
        let (Some(mut value), Some(mut key)) = (children.pop(), children.pop()) else {
            return;
        };
        key.name = "key".to_string();
        value.name = "value".to_string();
        let name = key.value.clone().unwrap_or_default();
        let reference = self.handles.create(path.child(&name)).get();
        children.push(Variable {
            name,
            value: value.value.clone(),
            type_field: None,
            reference,
            children: vec![key, value],
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::VariableScope;

    fn parse(frame: &str, name: &str) -> (Option<Variable>, VariableHandles) {
        let mut handles = VariableHandles::default();
        let variable = VariableParser::new(&mut handles, IndentRules::default())
            .parse_print_output(frame, VariablePath::root(VariableScope::Locals, name));
        (variable, handles)
    }

    fn names(variables: &[Variable]) -> Vec<&str> {
        variables.iter().map(|it| it.name.as_str()).collect()
    }

    #[test]
    fn test_leaf() {
        let (variable, handles) = parse("x = 5 (Number)", "x");
        assert_eq!(
            variable.unwrap(),
            Variable {
                name: "x".to_string(),
                value: Some("5".to_string()),
                type_field: Some("Number".to_string()),
                reference: 0,
                children: vec![],
            },
        );
        assert!(handles.is_empty());
    }

    #[test]
    fn test_null() {
        let (variable, _) = parse("y = null", "y");
        assert_eq!(
            variable.unwrap(),
            Variable {
                name: "y".to_string(),
                value: Some("null".to_string()),
                type_field: Some("undefined".to_string()),
                reference: 0,
                children: vec![],
            },
        );
    }

    #[test]
    fn test_no_symbol() {
        let (variable, _) = parse("No symbol \"ghost\" in current context.", "ghost");
        assert_eq!(variable, None);
    }

    #[test]
    fn test_object_with_nested_members() {
        let frame = "obj = 0x12 (MyApp.Foo)\r\n\
            \x20 count = 5 (Lang.Number)\r\n\
            \x20 nothing = null\r\n\
            \x20 label =\r\n\
            \x20   0x20 (Lang.String)\r\n\
            \x20   \"a = b, c\",\r\n\
            \x20 inner =\r\n\
            \x20   0x30 (MyApp.Bar)\r\n\
            \x20   flag = true (Lang.Boolean)\r\n\
            \x20   empty =\r\n\
            \x20     0x31 (MyApp.Empty)\r\n\
            \x20 after = 1 (Lang.Number)\r\n";
        let (variable, handles) = parse(frame, "obj");
        let obj = variable.unwrap();
        assert_eq!(obj.value.as_deref(), Some("0x12"));
        assert_eq!(obj.type_field.as_deref(), Some("MyApp.Foo"));
        assert_ne!(obj.reference, 0);
        assert_eq!(names(&obj.children), vec!["count", "nothing", "label", "inner", "after"]);

        let label = &obj.children[2];
        assert_eq!(label.value.as_deref(), Some("\"a = b, c\""));
        assert_eq!(label.reference, 0);

        let inner = &obj.children[3];
        assert_ne!(inner.reference, 0);
        assert_eq!(names(&inner.children), vec!["flag", "empty"]);
        let empty = &inner.children[1];
        assert!(empty.children.is_empty());
        assert_ne!(empty.reference, 0);

        assert_eq!(handles.len(), 3);
        assert_eq!(
            handles.get(inner.reference).unwrap().segments,
            vec!["obj".to_string(), "inner".to_string()],
        );
    }

    #[test]
    fn test_array() {
        let frame = "items = 0x40 (Lang.Array)\r\n\
            \x20 [\r\n\
            \x20   [0] = 1 (Lang.Number),\r\n\
            \x20   [1] = null,\r\n\
            \x20   [2] =\r\n\
            \x20     0x41 (Lang.Array)\r\n\
            \x20     [\r\n\
            \x20       [0] = 3 (Lang.Number)\r\n\
            \x20     ]\r\n\
            \x20 ]\r\n";
        let (variable, _) = parse(frame, "items");
        let items = variable.unwrap();
        assert_eq!(names(&items.children), vec!["0", "1", "2"]);
        assert_eq!(items.children[0].type_field.as_deref(), Some("Lang.Number"));
        assert_eq!(items.children[1].type_field.as_deref(), Some("undefined"));
        let nested = &items.children[2];
        assert_ne!(nested.reference, 0);
        assert_eq!(nested.children, vec![Variable::leaf("0", "3", Some("Lang.Number".to_string()))]);
    }

    #[test]
    fn test_dictionary_pairs() {
        let frame = "dict = 0x50 (Lang.Dictionary)\r\n\
            \x20 {\r\n\
            \x20   \"a\" (Lang.String)\r\n\
            \x20   =>\r\n\
            \x20   1 (Lang.Number),\r\n\
            \x20   \"b\" (Lang.String)\r\n\
            \x20   =>\r\n\
            \x20   null\r\n\
            \x20 }\r\n";
        let (variable, _) = parse(frame, "dict");
        let dict = variable.unwrap();
        assert_ne!(dict.reference, 0);
        assert_eq!(names(&dict.children), vec!["\"a\"", "\"b\""]);

        let first = &dict.children[0];
        assert_ne!(first.reference, 0);
        assert_eq!(first.value.as_deref(), Some("1"));
        assert_eq!(names(&first.children), vec!["key", "value"]);
        assert_eq!(first.children[0].value.as_deref(), Some("\"a\""));
        assert_eq!(first.children[1].type_field.as_deref(), Some("Lang.Number"));

        let second = &dict.children[1];
        assert_eq!(second.value.as_deref(), Some("null"));
        assert_ne!(second.reference, first.reference);
    }

    #[test]
    fn test_dictionary_with_container_key() {
        let frame = "dict = 0x50 (Lang.Dictionary)\r\n\
            \x20 {\r\n\
            \x20   <0x61> (Lang.Array)\r\n\
            \x20       [0] = 2 (Lang.Number)\r\n\
            \x20   =>\r\n\
            \x20   \"x\" (Lang.String)\r\n\
            \x20 }\r\n";
        let (variable, _) = parse(frame, "dict");
        let dict = variable.unwrap();
        assert_eq!(dict.children.len(), 1);
        let pair = &dict.children[0];
        assert_eq!(pair.name, "<0x61>");
        let key = &pair.children[0];
        assert_eq!(key.name, "key");
        assert_ne!(key.reference, 0);
        assert_eq!(key.children, vec![Variable::leaf("0", "2", Some("Lang.Number".to_string()))]);
        assert_eq!(pair.children[1].value.as_deref(), Some("\"x\""));
    }

    #[test]
    fn test_resynchronizes_on_unexpected_indentation() {
        let frame = "items = 0x40 (Lang.Array)\r\n\
            \x20 [\r\n\
            \x20  [0] = 1 (Lang.Number),\r\n\
            \x20  [1] = 2 (Lang.Number)\r\n\
            \x20 ]\r\n";
        let (variable, _) = parse(frame, "items");
        assert_eq!(names(&variable.unwrap().children), vec!["0", "1"]);
    }

    #[test]
    fn test_malformed_output_keeps_partial_tree() {
        let frame = "obj = 0x12 (MyApp.Foo)\r\n\
            \x20 count = 5 (Lang.Number)\r\n\
            \x20 broken =\r\n\
            garbage";
        let (variable, _) = parse(frame, "obj");
        let obj = variable.unwrap();
        assert_eq!(names(&obj.children), vec!["count", "broken"]);
        assert_eq!(obj.children[1].reference, 0);
    }

    #[test]
    fn test_empty_top_level_containers() {
        let (variable, handles) = parse("items = 0x40 (Lang.Array)\r\n  [\r\n  ]\r\n", "items");
        let items = variable.unwrap();
        assert_ne!(items.reference, 0);
        assert!(items.children.is_empty());
        assert_eq!(handles.len(), 1);

        let (variable, _) = parse("dict = 0x50 (Lang.Dictionary)\r\n  {\r\n  }\r\n", "dict");
        let dict = variable.unwrap();
        assert_ne!(dict.reference, 0);
        assert!(dict.children.is_empty());
    }

    #[test]
    fn test_string_containing_the_pair_separator() {
        let frame = "dict = 0x50 (Lang.Dictionary)\r\n\
            \x20 {\r\n\
            \x20   \"k\" (Lang.String)\r\n\
            \x20   =>\r\n\
            \x20   \"a => b\" (Lang.String)\r\n\
            \x20 }\r\n";
        let (variable, _) = parse(frame, "dict");
        let dict = variable.unwrap();
        assert_eq!(names(&dict.children), vec!["\"k\""]);
        let pair = &dict.children[0];
        assert_eq!(pair.value.as_deref(), Some("\"a => b\""));
        assert_eq!(names(&pair.children), vec!["key", "value"]);
        assert_eq!(pair.children[1].type_field.as_deref(), Some("Lang.String"));
    }

    #[test]
    fn test_array_of_dictionaries_of_arrays() {
        let frame = "items = 0x40 (Lang.Array)\r\n\
            \x20 [\r\n\
            \x20   [0] =\r\n\
            \x20     0x41 (Lang.Dictionary)\r\n\
            \x20     {\r\n\
            \x20       \"k\" (Lang.String)\r\n\
            \x20       =>\r\n\
            \x20       <0x42> (Lang.Array)\r\n\
            \x20           [0] = 7 (Lang.Number)\r\n\
            \x20     }\r\n\
            \x20   [1] = 2 (Lang.Number)\r\n\
            \x20 ]\r\n";
        let (variable, handles) = parse(frame, "items");
        let items = variable.unwrap();
        assert_eq!(names(&items.children), vec!["0", "1"]);
        assert_eq!(items.children[1].value.as_deref(), Some("2"));

        let dict = &items.children[0];
        assert_eq!(dict.type_field.as_deref(), Some("Lang.Dictionary"));
        assert_ne!(dict.reference, 0);
        assert_eq!(names(&dict.children), vec!["\"k\""]);

        let pair = &dict.children[0];
        let inner = &pair.children[1];
        assert_eq!(inner.name, "value");
        assert_eq!(inner.type_field.as_deref(), Some("Lang.Array"));
        assert_eq!(inner.children, vec![Variable::leaf("0", "7", Some("Lang.Number".to_string()))]);

        let mut references = vec![items.reference, dict.reference, pair.reference, inner.reference];
        assert!(references.iter().all(|it| *it != 0));
        references.sort_unstable();
        references.dedup();
        assert_eq!(references.len(), 4);
        assert_eq!(handles.len(), 4);
        assert_eq!(
            handles.get(dict.reference).unwrap().segments,
            vec!["items".to_string(), "0".to_string()],
        );
    }

    #[test]
    fn test_top_level_string() {
        let (variable, _) = parse("label = 0x20 (Lang.String)\r\n  \"hi there\"\r\n", "label");
        assert_eq!(
            variable.unwrap(),
            Variable::leaf("label", "\"hi there\"", Some("Lang.String".to_string())),
        );
    }
}
