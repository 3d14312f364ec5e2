//! CSS serialization.
//!
//! Turns the collected style records of one file scope into stylesheet text.
//! Plain rule blocks come out in collection order; conditional rules
//! (`@media`, `@container`, `@supports`, `@layer`) are merged across records
//! by their condition text and emitted after every plain block, conditions
//! ordered by first encounter. Within a rule, CSS variable assignments render before
//! property declarations.

use crate::adapter::{Composition, CssRecordKind};
use crate::error::{Result, VexError};
use crate::value::{format_number, ObjectMap, Value};
use std::collections::{HashMap, HashSet};

const INDENT: &str = "  ";

const CONDITIONAL_KEYS: [&str; 4] = ["@media", "@container", "@supports", "@layer"];

/// Serializes the records of a single scope. Selector templates are resolved
/// against `local_class_names` and `compositions`; composition identifiers
/// referenced from a selector are reported through `used_compositions` so the
/// caller can exempt them from pruning.
pub struct CssSerializer<'a> {
    local_class_names: &'a HashSet<String>,
    compositions: &'a [Composition],
    used: HashSet<String>,
}

impl<'a> CssSerializer<'a> {
    pub fn new(local_class_names: &'a HashSet<String>, compositions: &'a [Composition]) -> Self {
        Self {
            local_class_names,
            compositions,
            used: HashSet::new(),
        }
    }

    /// Composition identifiers that selector templates referenced.
    pub fn used_compositions(self) -> HashSet<String> {
        self.used
    }

    pub fn serialize(&mut self, records: &[CssRecordKind]) -> Result<String> {
        let mut lines: Vec<String> = Vec::new();
        let mut conditionals = ConditionalRuleset::default();

        for record in records {
            match record {
                CssRecordKind::Rule { selector, rule } => {
                    let base = format!(".{}", selector);
                    self.emit_rule(&base, rule, &mut lines, &mut conditionals)?;
                }
                CssRecordKind::GlobalRule { selector, rule } => {
                    self.emit_rule(selector, rule, &mut lines, &mut conditionals)?;
                }
                CssRecordKind::FontFace { rule } => {
                    let decls = self.declarations(rule)?;
                    push_block("@font-face", &decls, 0, &mut lines);
                }
                CssRecordKind::Keyframes { name, frames } => {
                    self.emit_keyframes(name, frames, &mut lines)?;
                }
                CssRecordKind::Property { name, rule } => {
                    self.emit_property(name, rule, &mut lines)?;
                }
            }
        }

        conditionals.render(0, &mut lines);

        if lines.is_empty() {
            Ok(String::new())
        } else {
            Ok(format!("{}\n", lines.join("\n")))
        }
    }

    fn emit_rule(
        &mut self,
        base_selector: &str,
        rule: &ObjectMap,
        lines: &mut Vec<String>,
        conditionals: &mut ConditionalRuleset,
    ) -> Result<()> {
        let mut decls = Vec::new();
        let mut pseudo_blocks: Vec<(String, &ObjectMap)> = Vec::new();
        let mut selector_blocks: Vec<(String, &ObjectMap)> = Vec::new();

        for (key, value) in rule.iter() {
            if key == "vars" {
                let vars = value.as_object().ok_or_else(|| {
                    VexError::Serialize("'vars' must be an object of variable assignments".into())
                })?;
                // Vars render before any property declaration.
                let mut var_decls = Vec::new();
                for (var_key, var_value) in vars.iter() {
                    let text = var_value.to_css_string().ok_or_else(|| {
                        VexError::Serialize(format!("invalid value for variable '{}'", var_key))
                    })?;
                    var_decls.push(format!("{}: {};", var_name(var_key), text));
                }
                var_decls.extend(std::mem::take(&mut decls));
                decls = var_decls;
            } else if key == "selectors" {
                let selectors = value.as_object().ok_or_else(|| {
                    VexError::Serialize("'selectors' must be an object".into())
                })?;
                for (template, sub) in selectors.iter() {
                    let sub = sub.as_object().ok_or_else(|| {
                        VexError::Serialize(format!("selector '{}' must map to a style object", template))
                    })?;
                    let resolved = self.transform_selector(template, base_selector)?;
                    selector_blocks.push((resolved, sub));
                }
            } else if let Some(kind) = CONDITIONAL_KEYS.iter().find(|k| key == **k) {
                let conditions = value.as_object().ok_or_else(|| {
                    VexError::Serialize(format!("'{}' must be an object of conditions", kind))
                })?;
                for (condition, sub) in conditions.iter() {
                    let sub = sub.as_object().ok_or_else(|| {
                        VexError::Serialize(format!("condition '{}' must map to a style object", condition))
                    })?;
                    let bucket = conditionals.bucket(&format!("{} {}", kind, condition));
                    self.emit_rule(base_selector, sub, &mut bucket.lines, &mut bucket.nested)?;
                }
            } else if key.starts_with(':') {
                let sub = value.as_object().ok_or_else(|| {
                    VexError::Serialize(format!("pseudo '{}' must map to a style object", key))
                })?;
                pseudo_blocks.push((format!("{}{}", base_selector, key), sub));
            } else if key.starts_with('@') {
                return Err(VexError::Serialize(format!("unsupported at-rule '{}'", key)));
            } else {
                self.declaration(key, value, &mut decls)?;
            }
        }

        if !decls.is_empty() {
            push_block(base_selector, &decls, 0, lines);
        }
        for (selector, sub) in pseudo_blocks {
            self.emit_rule(&selector, sub, lines, conditionals)?;
        }
        for (selector, sub) in selector_blocks {
            self.emit_rule(&selector, sub, lines, conditionals)?;
        }
        Ok(())
    }

    fn emit_keyframes(
        &mut self,
        name: &str,
        frames: &ObjectMap,
        lines: &mut Vec<String>,
    ) -> Result<()> {
        lines.push(format!("@keyframes {} {{", name));
        for (frame, rule) in frames.iter() {
            let rule = rule.as_object().ok_or_else(|| {
                VexError::Serialize(format!("keyframe '{}' must map to a style object", frame))
            })?;
            let decls = self.declarations(rule)?;
            push_block(frame, &decls, 1, lines);
        }
        lines.push("}".to_string());
        Ok(())
    }

    fn emit_property(&mut self, name: &str, rule: &ObjectMap, lines: &mut Vec<String>) -> Result<()> {
        let mut decls = Vec::new();
        for (key, value) in rule.iter() {
            let text = value.to_css_string().ok_or_else(|| {
                VexError::Serialize(format!("invalid value for '{}' in @property rule", key))
            })?;
            // The syntax descriptor is always quoted.
            let text = if key == "syntax" && !text.starts_with('"') {
                format!("\"{}\"", text)
            } else {
                text
            };
            decls.push(format!("{}: {};", kebab_case(key), text));
        }
        push_block(&format!("@property {}", name), &decls, 0, lines);
        Ok(())
    }

    fn declarations(&self, rule: &ObjectMap) -> Result<Vec<String>> {
        let mut decls = Vec::new();
        for (key, value) in rule.iter() {
            self.declaration(key, value, &mut decls)?;
        }
        Ok(decls)
    }

    fn declaration(&self, key: &str, value: &Value, decls: &mut Vec<String>) -> Result<()> {
        let property = if key.starts_with("--") {
            key.to_string()
        } else {
            kebab_case(key)
        };
        match value {
            Value::Null | Value::Undefined => Ok(()),
            Value::Str(s) => {
                decls.push(format!("{}: {};", property, s));
                Ok(())
            }
            Value::Number(n) => {
                decls.push(format!("{}: {};", property, format_number(*n)));
                Ok(())
            }
            // Arrays express declaration-level fallbacks.
            Value::Array(items) => {
                for item in items {
                    let text = item.to_css_string().ok_or_else(|| {
                        VexError::Serialize(format!("invalid fallback value for '{}'", key))
                    })?;
                    decls.push(format!("{}: {};", property, text));
                }
                Ok(())
            }
            other => Err(VexError::Serialize(format!(
                "invalid value of type {} for property '{}'",
                other.type_name(),
                key
            ))),
        }
    }

    /// Resolve a `selectors` template: composition class lists collapse into
    /// dotted chains, bare local class names gain their dot, and `&` becomes
    /// the rule's own selector.
    fn transform_selector(&mut self, template: &str, base_selector: &str) -> Result<String> {
        if !template.contains('&') {
            return Err(VexError::InvalidSelector {
                selector: template.to_string(),
                message: "selector must reference '&'".to_string(),
            });
        }

        let mut resolved = template.to_string();

        // Longest class lists first so overlapping compositions resolve
        // deterministically.
        let mut compositions: Vec<&Composition> = self.compositions.iter().collect();
        compositions.sort_by_key(|c| std::cmp::Reverse(c.class_list.len()));
        for composition in compositions {
            if !resolved.contains(&composition.class_list) {
                continue;
            }
            let mut dotted = String::new();
            for class in composition.class_list.split_whitespace() {
                if !self.local_class_names.contains(class) {
                    return Err(VexError::UnresolvedClassName {
                        name: class.to_string(),
                        selector: template.to_string(),
                    });
                }
                dotted.push('.');
                dotted.push_str(class);
            }
            resolved = resolved.replace(&composition.class_list, &dotted);
            self.used.insert(composition.identifier.clone());
        }

        let dotted_locals = dot_local_classes(&resolved, self.local_class_names);
        Ok(dotted_locals.replace('&', base_selector))
    }
}

/// Prefix a dot onto identifier tokens that name a locally registered class.
fn dot_local_classes(selector: &str, local: &HashSet<String>) -> String {
    let mut out = String::with_capacity(selector.len());
    let mut token = String::new();
    let mut prev: Option<char> = None;

    let flush = |token: &mut String, out: &mut String, prev: Option<char>| {
        if !token.is_empty() {
            if local.contains(token.as_str()) && prev != Some('.') {
                out.push('.');
            }
            out.push_str(token);
            token.clear();
        }
    };

    for c in selector.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            token.push(c);
        } else {
            flush(&mut token, &mut out, prev);
            out.push(c);
            prev = Some(c);
        }
    }
    flush(&mut token, &mut out, prev);
    out
}

fn var_name(key: &str) -> String {
    key.strip_prefix("var(")
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(key)
        .to_string()
}

/// camelCase to kebab-case; a leading uppercase letter marks a vendor prefix
/// (`WebkitBoxShadow` -> `-webkit-box-shadow`).
pub fn kebab_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn push_block(selector: &str, decls: &[String], indent: usize, lines: &mut Vec<String>) {
    let pad = INDENT.repeat(indent);
    lines.push(format!("{}{} {{", pad, selector));
    for decl in decls {
        lines.push(format!("{}{}{}", pad, INDENT, decl));
    }
    lines.push(format!("{}}}", pad));
}

#[derive(Debug, Default)]
struct ConditionalRuleset {
    order: Vec<String>,
    buckets: HashMap<String, ConditionalBucket>,
}

#[derive(Debug, Default)]
struct ConditionalBucket {
    lines: Vec<String>,
    nested: ConditionalRuleset,
}

impl ConditionalRuleset {
    fn bucket(&mut self, condition: &str) -> &mut ConditionalBucket {
        if !self.buckets.contains_key(condition) {
            self.order.push(condition.to_string());
        }
        self.buckets.entry(condition.to_string()).or_default()
    }

    fn render(&self, indent: usize, lines: &mut Vec<String>) {
        let pad = INDENT.repeat(indent);
        for condition in &self.order {
            let bucket = &self.buckets[condition];
            lines.push(format!("{}{} {{", pad, condition));
            for line in &bucket.lines {
                lines.push(format!("{}{}{}", pad, INDENT, line));
            }
            bucket.nested.render(indent + 1, lines);
            lines.push(format!("{}}}", pad));
        }
    }
}
