//! Host styling API injected into sandboxed module execution.
//!
//! Each builtin is a thin shim over the injected `StyleAdapter` capability:
//! it generates scoped identifiers, files style records, and returns the
//! plain values (class names, var references) the module exports.

use crate::adapter::{Composition, CssRecordKind, StyleAdapter};
use crate::error::{Result, VexError};
use crate::value::{ObjectMap, Value};
use std::path::Path;

/// Name of the host styling package intercepted by the module loader.
pub const STYLE_PACKAGE: &str = "@vanilla-extract/css";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinFn {
    Style,
    StyleVariants,
    GlobalStyle,
    FontFace,
    GlobalFontFace,
    Keyframes,
    GlobalKeyframes,
    CreateVar,
    FallbackVar,
    CreateContainer,
    CreateTheme,
}

/// The namespace object returned when a module imports the style package.
pub fn namespace() -> Value {
    let mut ns = ObjectMap::new();
    ns.insert("style", Value::Builtin(BuiltinFn::Style));
    ns.insert("styleVariants", Value::Builtin(BuiltinFn::StyleVariants));
    ns.insert("globalStyle", Value::Builtin(BuiltinFn::GlobalStyle));
    ns.insert("fontFace", Value::Builtin(BuiltinFn::FontFace));
    ns.insert("globalFontFace", Value::Builtin(BuiltinFn::GlobalFontFace));
    ns.insert("keyframes", Value::Builtin(BuiltinFn::Keyframes));
    ns.insert("globalKeyframes", Value::Builtin(BuiltinFn::GlobalKeyframes));
    ns.insert("createVar", Value::Builtin(BuiltinFn::CreateVar));
    ns.insert("fallbackVar", Value::Builtin(BuiltinFn::FallbackVar));
    ns.insert("createContainer", Value::Builtin(BuiltinFn::CreateContainer));
    ns.insert("createTheme", Value::Builtin(BuiltinFn::CreateTheme));
    Value::Object(ns)
}

pub fn call(
    f: BuiltinFn,
    args: Vec<Value>,
    adapter: &mut dyn StyleAdapter,
    path: &Path,
) -> Result<Value> {
    match f {
        BuiltinFn::Style => {
            let (arg, debug) = split_debug_arg(args);
            let arg = arg.ok_or_else(|| VexError::execution(path, "style() requires a style argument"))?;
            style_impl(adapter, path, arg, debug.as_deref())
        }
        BuiltinFn::StyleVariants => {
            let (arg, debug) = split_debug_arg(args);
            let map = match arg {
                Some(Value::Object(map)) => map,
                other => {
                    return Err(VexError::execution(
                        path,
                        format!(
                            "styleVariants() expects an object of variants, got {}",
                            type_of(&other)
                        ),
                    ))
                }
            };
            let mut out = ObjectMap::new();
            for (key, variant) in map.iter() {
                let variant_debug = match &debug {
                    Some(debug) => format!("{}_{}", debug, key),
                    None => key.to_string(),
                };
                let class = style_impl(adapter, path, variant.clone(), Some(&variant_debug))?;
                out.insert(key, class);
            }
            Ok(Value::Object(out))
        }
        BuiltinFn::GlobalStyle => {
            let mut args = args.into_iter();
            let selector = expect_string(path, args.next(), "globalStyle() selector")?;
            let rule = expect_object(path, args.next(), "globalStyle() rule")?;
            adapter.append_css(CssRecordKind::GlobalRule { selector, rule })?;
            Ok(Value::Undefined)
        }
        BuiltinFn::FontFace => {
            let (arg, debug) = split_debug_arg(args);
            let rule = expect_object(path, arg, "fontFace() rule")?;
            if rule.contains_key("fontFamily") {
                return Err(VexError::execution(
                    path,
                    "fontFace() must not declare fontFamily; it is generated",
                ));
            }
            let family = format!("\"{}\"", adapter.generate_scoped_identifier(debug.as_deref())?);
            let mut rule = rule;
            rule.insert("fontFamily", Value::Str(family.clone()));
            adapter.append_css(CssRecordKind::FontFace { rule })?;
            Ok(Value::Str(family))
        }
        BuiltinFn::GlobalFontFace => {
            let mut args = args.into_iter();
            let family = expect_string(path, args.next(), "globalFontFace() family")?;
            let rule = expect_object(path, args.next(), "globalFontFace() rule")?;
            let mut rule = rule;
            rule.insert("fontFamily", Value::Str(family));
            adapter.append_css(CssRecordKind::FontFace { rule })?;
            Ok(Value::Undefined)
        }
        BuiltinFn::Keyframes => {
            let (arg, debug) = split_debug_arg(args);
            let frames = expect_object(path, arg, "keyframes() frames")?;
            let name = adapter.generate_scoped_identifier(debug.as_deref())?;
            adapter.append_css(CssRecordKind::Keyframes {
                name: name.clone(),
                frames,
            })?;
            Ok(Value::Str(name))
        }
        BuiltinFn::GlobalKeyframes => {
            let mut args = args.into_iter();
            let name = expect_string(path, args.next(), "globalKeyframes() name")?;
            let frames = expect_object(path, args.next(), "globalKeyframes() frames")?;
            adapter.append_css(CssRecordKind::Keyframes { name, frames })?;
            Ok(Value::Undefined)
        }
        BuiltinFn::CreateVar => create_var(adapter, path, args),
        BuiltinFn::FallbackVar => fallback_var(path, args),
        BuiltinFn::CreateContainer => {
            let debug = first_debug_arg(args);
            let name = adapter.generate_scoped_identifier(debug.as_deref())?;
            Ok(Value::Str(name))
        }
        BuiltinFn::CreateTheme => create_theme(adapter, path, args),
    }
}

/// Shared implementation for `style` and `styleVariants` entries.
fn style_impl(
    adapter: &mut dyn StyleAdapter,
    path: &Path,
    arg: Value,
    debug_id: Option<&str>,
) -> Result<Value> {
    let ident = adapter.generate_scoped_identifier(debug_id)?;
    adapter.register_class_name(&ident);

    match arg {
        Value::Object(rule) => {
            adapter.append_css(CssRecordKind::Rule {
                selector: ident.clone(),
                rule,
            })?;
            Ok(Value::Str(ident))
        }
        Value::Array(items) => {
            let mut own_rule = ObjectMap::new();
            let mut class_list = vec![ident.clone()];
            for item in items {
                match item {
                    Value::Str(classes) => {
                        for class in classes.split_whitespace() {
                            if !class_list.iter().any(|c| c == class) {
                                class_list.push(class.to_string());
                            }
                        }
                    }
                    Value::Object(rule) => own_rule.merge(&rule),
                    other => {
                        return Err(VexError::execution(
                            path,
                            format!(
                                "style() composition entries must be class names or style objects, got {}",
                                other.type_name()
                            ),
                        ))
                    }
                }
            }
            if !own_rule.is_empty() {
                adapter.append_css(CssRecordKind::Rule {
                    selector: ident.clone(),
                    rule: own_rule,
                })?;
            }
            let joined = class_list.join(" ");
            adapter.register_composition(Composition {
                identifier: ident,
                class_list: joined.clone(),
            });
            Ok(Value::Str(joined))
        }
        other => Err(VexError::execution(
            path,
            format!(
                "style() expects a style object or composition array, got {}",
                other.type_name()
            ),
        )),
    }
}

fn create_var(adapter: &mut dyn StyleAdapter, path: &Path, args: Vec<Value>) -> Result<Value> {
    let mut options: Option<ObjectMap> = None;
    let mut debug: Option<String> = None;
    for arg in args {
        match arg {
            Value::Object(map) => options = Some(map),
            Value::Str(s) => debug = Some(s),
            other => {
                return Err(VexError::execution(
                    path,
                    format!("createVar() got unexpected {} argument", other.type_name()),
                ))
            }
        }
    }

    let ident = adapter.generate_scoped_identifier(debug.as_deref())?;
    let var_name = format!("--{}", ident);
    if let Some(rule) = options {
        adapter.append_css(CssRecordKind::Property {
            name: var_name.clone(),
            rule,
        })?;
    }
    Ok(Value::Str(format!("var({})", var_name)))
}

fn fallback_var(path: &Path, args: Vec<Value>) -> Result<Value> {
    if args.len() < 2 {
        return Err(VexError::execution(
            path,
            "fallbackVar() requires a var reference and a fallback",
        ));
    }
    let mut parts = Vec::with_capacity(args.len());
    for arg in &args {
        let text = arg.to_css_string().ok_or_else(|| {
            VexError::execution(
                path,
                format!("fallbackVar() arguments must be css values, got {}", arg.type_name()),
            )
        })?;
        parts.push(text);
    }

    let mut acc = parts.pop().expect("len checked above");
    while let Some(var_ref) = parts.pop() {
        let inner = var_ref
            .strip_prefix("var(")
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| {
                VexError::execution(
                    path,
                    format!("fallbackVar() expected a var reference, got '{}'", var_ref),
                )
            })?;
        acc = format!("var({}, {})", inner, acc);
    }
    Ok(Value::Str(acc))
}

fn create_theme(adapter: &mut dyn StyleAdapter, path: &Path, args: Vec<Value>) -> Result<Value> {
    let mut objects: Vec<ObjectMap> = Vec::new();
    let mut debug: Option<String> = None;
    for arg in args {
        match arg {
            Value::Object(map) => objects.push(map),
            Value::Str(s) => debug = Some(s),
            other => {
                return Err(VexError::execution(
                    path,
                    format!("createTheme() got unexpected {} argument", other.type_name()),
                ))
            }
        }
    }

    let class = adapter.generate_scoped_identifier(debug.as_deref())?;
    adapter.register_class_name(&class);

    match objects.len() {
        // createTheme(tokens) -> [class, vars]
        1 => {
            let tokens = objects.pop().expect("len checked");
            let mut assignments = ObjectMap::new();
            let vars = build_theme_vars(adapter, path, &tokens, &mut assignments)?;
            let mut rule = ObjectMap::new();
            rule.insert("vars", Value::Object(assignments));
            adapter.append_css(CssRecordKind::Rule {
                selector: class.clone(),
                rule,
            })?;
            Ok(Value::Array(vec![Value::Str(class), Value::Object(vars)]))
        }
        // createTheme(contract, tokens) -> class
        2 => {
            let tokens = objects.pop().expect("len checked");
            let contract = objects.pop().expect("len checked");
            let mut assignments = ObjectMap::new();
            assign_theme_contract(path, &contract, &tokens, &mut assignments)?;
            let mut rule = ObjectMap::new();
            rule.insert("vars", Value::Object(assignments));
            adapter.append_css(CssRecordKind::Rule {
                selector: class.clone(),
                rule,
            })?;
            Ok(Value::Str(class))
        }
        _ => Err(VexError::execution(
            path,
            "createTheme() expects tokens, or a contract and tokens",
        )),
    }
}

/// Walk a token tree creating one var per leaf; `assignments` maps the var
/// reference to its value, the returned object mirrors the token shape with
/// var references at the leaves.
fn build_theme_vars(
    adapter: &mut dyn StyleAdapter,
    path: &Path,
    tokens: &ObjectMap,
    assignments: &mut ObjectMap,
) -> Result<ObjectMap> {
    let mut vars = ObjectMap::new();
    for (key, value) in tokens.iter() {
        match value {
            Value::Object(nested) => {
                let nested_vars = build_theme_vars(adapter, path, nested, assignments)?;
                vars.insert(key, Value::Object(nested_vars));
            }
            leaf => {
                let text = leaf.to_css_string().ok_or_else(|| {
                    VexError::execution(
                        path,
                        format!("theme token '{}' must be a css value, got {}", key, leaf.type_name()),
                    )
                })?;
                let var_ref = format!("var(--{})", adapter.generate_scoped_identifier(Some(key))?);
                assignments.insert(var_ref.clone(), Value::Str(text));
                vars.insert(key, Value::Str(var_ref));
            }
        }
    }
    Ok(vars)
}

fn assign_theme_contract(
    path: &Path,
    contract: &ObjectMap,
    tokens: &ObjectMap,
    assignments: &mut ObjectMap,
) -> Result<()> {
    for (key, slot) in contract.iter() {
        let value = tokens.get(key).ok_or_else(|| {
            VexError::execution(path, format!("theme tokens missing contract key '{}'", key))
        })?;
        match (slot, value) {
            (Value::Object(nested_contract), Value::Object(nested_tokens)) => {
                assign_theme_contract(path, nested_contract, nested_tokens, assignments)?;
            }
            (Value::Str(var_ref), leaf) => {
                let text = leaf.to_css_string().ok_or_else(|| {
                    VexError::execution(
                        path,
                        format!("theme token '{}' must be a css value, got {}", key, leaf.type_name()),
                    )
                })?;
                assignments.insert(var_ref.clone(), Value::Str(text));
            }
            _ => {
                return Err(VexError::execution(
                    path,
                    format!("theme contract key '{}' does not match token shape", key),
                ))
            }
        }
    }
    Ok(())
}

fn split_debug_arg(args: Vec<Value>) -> (Option<Value>, Option<String>) {
    let mut iter = args.into_iter();
    let arg = iter.next();
    let debug = iter.next().and_then(|v| match v {
        Value::Str(s) => Some(s),
        _ => None,
    });
    (arg, debug)
}

fn first_debug_arg(args: Vec<Value>) -> Option<String> {
    args.into_iter().next().and_then(|v| match v {
        Value::Str(s) => Some(s),
        _ => None,
    })
}

fn expect_string(path: &Path, arg: Option<Value>, what: &str) -> Result<String> {
    match arg {
        Some(Value::Str(s)) => Ok(s),
        other => Err(VexError::execution(
            path,
            format!("{} must be a string, got {}", what, type_of(&other)),
        )),
    }
}

fn expect_object(path: &Path, arg: Option<Value>, what: &str) -> Result<ObjectMap> {
    match arg {
        Some(Value::Object(map)) => Ok(map),
        other => Err(VexError::execution(
            path,
            format!("{} must be an object, got {}", what, type_of(&other)),
        )),
    }
}

fn type_of(arg: &Option<Value>) -> &'static str {
    match arg {
        Some(v) => v.type_name(),
        None => "nothing",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::StyleCollector;
    use crate::ident::IdentifierMode;
    use crate::scope::FileScope;
    use std::path::PathBuf;

    fn setup() -> (StyleCollector, PathBuf) {
        let mut collector = StyleCollector::new(IdentifierMode::Short);
        collector.begin_scope(FileScope::new("styles.css.ts", Some("pkg".to_string())));
        (collector, PathBuf::from("/styles.css.ts"))
    }

    fn obj(pairs: &[(&str, Value)]) -> Value {
        let mut map = ObjectMap::new();
        for (k, v) in pairs {
            map.insert(*k, v.clone());
        }
        Value::Object(map)
    }

    #[test]
    fn test_style_returns_registered_class() {
        let (mut collector, path) = setup();
        let rule = obj(&[("backgroundColor", Value::Str("red".to_string()))]);
        let result = call(BuiltinFn::Style, vec![rule], &mut collector, &path).unwrap();
        let class = result.as_str().unwrap().to_string();
        assert!(collector.local_class_names().contains(&class));
        assert_eq!(collector.records_for(collector.scopes().next().unwrap()).len(), 1);
    }

    #[test]
    fn test_style_composition_registers_and_dedupes() {
        let (mut collector, path) = setup();
        let arg = Value::Array(vec![
            Value::Str("base0 extra1".to_string()),
            Value::Str("extra1".to_string()),
        ]);
        let result = call(BuiltinFn::Style, vec![arg], &mut collector, &path).unwrap();
        let classes = result.as_str().unwrap();
        let parts: Vec<&str> = classes.split(' ').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(&parts[1..], &["base0", "extra1"]);
        assert_eq!(collector.compositions().len(), 1);
        // No own props, so nothing was appended for the composite class.
        assert_eq!(collector.scopes().count(), 0);
    }

    #[test]
    fn test_style_variants_produces_object() {
        let (mut collector, path) = setup();
        let variants = obj(&[
            ("primary", obj(&[("color", Value::Str("blue".to_string()))])),
            ("danger", obj(&[("color", Value::Str("red".to_string()))])),
        ]);
        let result = call(BuiltinFn::StyleVariants, vec![variants], &mut collector, &path).unwrap();
        let map = result.as_object().unwrap();
        assert_eq!(map.len(), 2);
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["primary", "danger"]);
    }

    #[test]
    fn test_font_face_generates_quoted_family() {
        let (mut collector, path) = setup();
        let rule = obj(&[("src", Value::Str("local(\"Impact\")".to_string()))]);
        let result = call(BuiltinFn::FontFace, vec![rule], &mut collector, &path).unwrap();
        let family = result.as_str().unwrap();
        assert!(family.starts_with('"') && family.ends_with('"'));
    }

    #[test]
    fn test_create_var_and_fallback() {
        let (mut collector, path) = setup();
        let var = call(BuiltinFn::CreateVar, vec![], &mut collector, &path).unwrap();
        let var_ref = var.as_str().unwrap().to_string();
        assert!(var_ref.starts_with("var(--"));

        let result = call(
            BuiltinFn::FallbackVar,
            vec![Value::Str(var_ref.clone()), Value::Number(0.25)],
            &mut collector,
            &path,
        )
        .unwrap();
        let inner = var_ref.strip_prefix("var(").unwrap().strip_suffix(')').unwrap();
        assert_eq!(
            result.as_str().unwrap(),
            format!("var({}, 0.25)", inner)
        );
    }

    #[test]
    fn test_create_var_with_property_options() {
        let (mut collector, path) = setup();
        let options = obj(&[
            ("syntax", Value::Str("<number>".to_string())),
            ("inherits", Value::Bool(false)),
            ("initialValue", Value::Number(0.5)),
        ]);
        call(BuiltinFn::CreateVar, vec![options], &mut collector, &path).unwrap();
        let scope = collector.scopes().next().unwrap().to_string();
        assert!(matches!(
            collector.records_for(&scope)[0],
            CssRecordKind::Property { .. }
        ));
    }

    #[test]
    fn test_create_theme_returns_class_and_vars() {
        let (mut collector, path) = setup();
        let tokens = obj(&[(
            "color",
            obj(&[("brand", Value::Str("blue".to_string()))]),
        )]);
        let result = call(BuiltinFn::CreateTheme, vec![tokens], &mut collector, &path).unwrap();
        match result {
            Value::Array(pair) => {
                assert!(matches!(&pair[0], Value::Str(_)));
                let vars = pair[1].as_object().unwrap();
                let brand = vars.get("color").unwrap().as_object().unwrap().get("brand").unwrap();
                assert!(brand.as_str().unwrap().starts_with("var(--"));
            }
            other => panic!("expected [class, vars], got {:?}", other),
        }
    }

    #[test]
    fn test_global_style_appends_record() {
        let (mut collector, path) = setup();
        call(
            BuiltinFn::GlobalStyle,
            vec![
                Value::Str("body".to_string()),
                obj(&[("margin", Value::Number(0.0))]),
            ],
            &mut collector,
            &path,
        )
        .unwrap();
        let scope = collector.scopes().next().unwrap().to_string();
        assert!(matches!(
            collector.records_for(&scope)[0],
            CssRecordKind::GlobalRule { .. }
        ));
    }
}
