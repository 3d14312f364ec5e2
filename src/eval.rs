//! Sandboxed evaluation of styling modules.
//!
//! Modules never run in a real JavaScript engine. Instead the typescript
//! source is parsed with oxc and interpreted over a deliberately small
//! expression subset: literals, template literals, object/array literals with
//! spread, member access, calls into the injected styling builtins, and the
//! operators styling code actually uses. Everything else is a hard execution
//! error, which keeps module execution deterministic and free of ambient
//! authority. The only capabilities a module can reach are the two traits
//! injected here: the style adapter and the module loader.

use crate::builtins;
use crate::error::{Result, VexError};
use crate::adapter::StyleAdapter;
use crate::value::{ObjectMap, Value};
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, ArrayExpressionElement, BinaryOperator, BindingPattern, Declaration, Expression,
    ImportDeclarationSpecifier, LogicalOperator, ModuleExportName, ObjectPropertyKind, Program,
    PropertyKey, Statement, UnaryOperator, VariableDeclaration,
};
use oxc_parser::Parser;
use oxc_span::SourceType;
use std::collections::HashMap;
use std::path::Path;

/// Module resolution capability. `load_module` returns the namespace object
/// of the requested module, executing it first if needed.
pub trait ModuleLoader {
    fn load_module(&mut self, specifier: &str, importer: &Path) -> Result<Value>;
}

/// The full capability surface handed to an executing module.
pub trait EvalEnv: StyleAdapter + ModuleLoader {}

impl<T: StyleAdapter + ModuleLoader> EvalEnv for T {}

/// Parse and interpret one styling module, returning its export map in
/// declaration order.
pub fn evaluate_module<E: EvalEnv>(path: &Path, source: &str, env: &mut E) -> Result<ObjectMap> {
    let allocator = Allocator::default();
    let source_type = SourceType::default()
        .with_typescript(true)
        .with_module(true);
    let ret = Parser::new(&allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        let message = ret
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(VexError::Parse {
            path: path.to_path_buf(),
            message,
        });
    }

    let mut interp = Interpreter {
        path,
        env,
        bindings: HashMap::new(),
        exports: ObjectMap::new(),
    };
    interp.run(&ret.program)?;
    Ok(interp.exports)
}

struct Interpreter<'a, E: EvalEnv> {
    path: &'a Path,
    env: &'a mut E,
    bindings: HashMap<String, Value>,
    exports: ObjectMap,
}

impl<'a, E: EvalEnv> Interpreter<'a, E> {
    fn err(&self, message: impl Into<String>) -> VexError {
        VexError::execution(self.path, message)
    }

    fn run(&mut self, program: &Program<'_>) -> Result<()> {
        for stmt in &program.body {
            self.eval_statement(stmt)?;
        }
        Ok(())
    }

    fn eval_statement(&mut self, stmt: &Statement<'_>) -> Result<()> {
        match stmt {
            Statement::ImportDeclaration(import_decl) => {
                if import_decl.import_kind.is_type() {
                    return Ok(());
                }
                let specifier = import_decl.source.value.to_string();
                let namespace = self.env.load_module(&specifier, self.path)?;
                let Some(specifiers) = &import_decl.specifiers else {
                    // Side-effect import; loading already executed the module.
                    return Ok(());
                };
                for spec in specifiers {
                    match spec {
                        ImportDeclarationSpecifier::ImportSpecifier(s) => {
                            if s.import_kind.is_type() {
                                continue;
                            }
                            let imported = export_name(&s.imported);
                            let value = self.namespace_member(&namespace, &imported, &specifier)?;
                            self.bindings.insert(s.local.name.to_string(), value);
                        }
                        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                            let value =
                                self.namespace_member(&namespace, "default", &specifier)?;
                            self.bindings.insert(s.local.name.to_string(), value);
                        }
                        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                            self.bindings
                                .insert(s.local.name.to_string(), namespace.clone());
                        }
                    }
                }
                Ok(())
            }
            Statement::ExportNamedDeclaration(decl) => {
                if decl.export_kind.is_type() {
                    return Ok(());
                }
                if let Some(Declaration::VariableDeclaration(var_decl)) = &decl.declaration {
                    let names = self.eval_variable_declaration(var_decl)?;
                    for name in names {
                        let value = self.bindings.get(&name).cloned().ok_or_else(|| {
                            self.err(format!("exported binding '{}' is not defined", name))
                        })?;
                        self.exports.insert(name, value);
                    }
                    return Ok(());
                }
                if decl.declaration.is_some() {
                    return Err(self.err("only variable declarations can be exported"));
                }
                let source_namespace = match &decl.source {
                    Some(source) => {
                        Some((self.env.load_module(&source.value, self.path)?, source.value.to_string()))
                    }
                    None => None,
                };
                for spec in &decl.specifiers {
                    let local = export_name(&spec.local);
                    let exported = export_name(&spec.exported);
                    let value = match &source_namespace {
                        Some((namespace, specifier)) => {
                            self.namespace_member(namespace, &local, specifier)?
                        }
                        None => self.bindings.get(&local).cloned().ok_or_else(|| {
                            self.err(format!("exported binding '{}' is not defined", local))
                        })?,
                    };
                    self.exports.insert(exported, value);
                }
                Ok(())
            }
            Statement::ExportDefaultDeclaration(decl) => {
                let Some(expr) = decl.declaration.as_expression() else {
                    return Err(self.err("only expressions can be default-exported"));
                };
                let value = self.eval_expression(expr)?;
                self.exports.insert("default", value);
                Ok(())
            }
            Statement::VariableDeclaration(var_decl) => {
                self.eval_variable_declaration(var_decl)?;
                Ok(())
            }
            Statement::ExpressionStatement(expr_stmt) => {
                self.eval_expression(&expr_stmt.expression)?;
                Ok(())
            }
            // Type-level statements have no runtime effect.
            Statement::TSTypeAliasDeclaration(_)
            | Statement::TSInterfaceDeclaration(_)
            | Statement::TSEnumDeclaration(_)
            | Statement::TSModuleDeclaration(_)
            | Statement::TSImportEqualsDeclaration(_)
            | Statement::EmptyStatement(_) => Ok(()),
            other => Err(self.err(format!(
                "unsupported top-level statement: {:?}",
                statement_kind(other)
            ))),
        }
    }

    /// Evaluate each declarator and bind its pattern. Returns every name the
    /// declaration introduced, in source order.
    fn eval_variable_declaration(&mut self, var_decl: &VariableDeclaration<'_>) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for declarator in &var_decl.declarations {
            let init = declarator
                .init
                .as_ref()
                .ok_or_else(|| self.err("declarations must be initialized"))?;
            let value = self.eval_expression(init)?;
            self.bind_pattern(&declarator.id, value, &mut names)?;
        }
        Ok(names)
    }

    fn bind_pattern(
        &mut self,
        pattern: &BindingPattern<'_>,
        value: Value,
        names: &mut Vec<String>,
    ) -> Result<()> {
        match pattern {
            BindingPattern::BindingIdentifier(id) => {
                let name = id.name.to_string();
                self.bindings.insert(name.clone(), value);
                names.push(name);
                Ok(())
            }
            BindingPattern::ObjectPattern(obj) => {
                let map = match &value {
                    Value::Object(map) => map,
                    other => {
                        return Err(self.err(format!(
                            "cannot destructure {} as an object",
                            other.type_name()
                        )))
                    }
                };
                for prop in &obj.properties {
                    let key = match &prop.key {
                        PropertyKey::StaticIdentifier(id) => id.name.to_string(),
                        PropertyKey::StringLiteral(s) => s.value.to_string(),
                        _ => return Err(self.err("unsupported destructuring key")),
                    };
                    let member = map.get(&key).cloned().unwrap_or(Value::Undefined);
                    self.bind_pattern(&prop.value, member, names)?;
                }
                if obj.rest.is_some() {
                    return Err(self.err("rest elements are not supported in destructuring"));
                }
                Ok(())
            }
            BindingPattern::ArrayPattern(arr) => {
                let items = match &value {
                    Value::Array(items) => items,
                    other => {
                        return Err(self.err(format!(
                            "cannot destructure {} as an array",
                            other.type_name()
                        )))
                    }
                };
                for (index, element) in arr.elements.iter().enumerate() {
                    if let Some(element) = element {
                        let item = items.get(index).cloned().unwrap_or(Value::Undefined);
                        self.bind_pattern(element, item, names)?;
                    }
                }
                if arr.rest.is_some() {
                    return Err(self.err("rest elements are not supported in destructuring"));
                }
                Ok(())
            }
            BindingPattern::AssignmentPattern(assign) => {
                let value = if value.is_nullish() {
                    self.eval_expression(&assign.right)?
                } else {
                    value
                };
                self.bind_pattern(&assign.left, value, names)
            }
        }
    }

    fn eval_expression(&mut self, expr: &Expression<'_>) -> Result<Value> {
        match expr {
            Expression::StringLiteral(lit) => Ok(Value::Str(lit.value.to_string())),
            Expression::NumericLiteral(lit) => Ok(Value::Number(lit.value)),
            Expression::BooleanLiteral(lit) => Ok(Value::Bool(lit.value)),
            Expression::NullLiteral(_) => Ok(Value::Null),
            Expression::Identifier(id) => {
                let name = id.name.as_str();
                if name == "undefined" {
                    return Ok(Value::Undefined);
                }
                self.bindings
                    .get(name)
                    .cloned()
                    .ok_or_else(|| self.err(format!("'{}' is not defined", name)))
            }
            Expression::TemplateLiteral(tpl) => {
                let mut result = String::new();
                for (index, quasi) in tpl.quasis.iter().enumerate() {
                    match &quasi.value.cooked {
                        Some(cooked) => result.push_str(cooked),
                        None => result.push_str(&quasi.value.raw),
                    }
                    if let Some(part) = tpl.expressions.get(index) {
                        let value = self.eval_expression(part)?;
                        let text = value.to_css_string().ok_or_else(|| {
                            self.err(format!(
                                "cannot interpolate {} into a template literal",
                                value.type_name()
                            ))
                        })?;
                        result.push_str(&text);
                    }
                }
                Ok(Value::Str(result))
            }
            Expression::ObjectExpression(obj) => {
                let mut map = ObjectMap::new();
                for prop in &obj.properties {
                    match prop {
                        ObjectPropertyKind::ObjectProperty(p) => {
                            let key = self.eval_property_key(&p.key, p.computed)?;
                            let value = self.eval_expression(&p.value)?;
                            map.insert(key, value);
                        }
                        ObjectPropertyKind::SpreadProperty(s) => {
                            let spread = self.eval_expression(&s.argument)?;
                            match spread {
                                Value::Object(other) => map.merge(&other),
                                Value::Null | Value::Undefined => {}
                                other => {
                                    return Err(self.err(format!(
                                        "cannot spread {} into an object",
                                        other.type_name()
                                    )))
                                }
                            }
                        }
                    }
                }
                Ok(Value::Object(map))
            }
            Expression::ArrayExpression(arr) => {
                let mut items = Vec::with_capacity(arr.elements.len());
                for element in &arr.elements {
                    match element {
                        ArrayExpressionElement::SpreadElement(s) => {
                            let spread = self.eval_expression(&s.argument)?;
                            match spread {
                                Value::Array(inner) => items.extend(inner),
                                other => {
                                    return Err(self.err(format!(
                                        "cannot spread {} into an array",
                                        other.type_name()
                                    )))
                                }
                            }
                        }
                        ArrayExpressionElement::Elision(_) => items.push(Value::Undefined),
                        other => {
                            let expr = other
                                .as_expression()
                                .ok_or_else(|| self.err("unsupported array element"))?;
                            items.push(self.eval_expression(expr)?);
                        }
                    }
                }
                Ok(Value::Array(items))
            }
            Expression::CallExpression(call) => {
                let callee = self.eval_expression(&call.callee)?;
                let Value::Builtin(f) = callee else {
                    return Err(self.err(format!("{} is not callable", callee.type_name())));
                };
                let mut args = Vec::with_capacity(call.arguments.len());
                for arg in &call.arguments {
                    match arg {
                        Argument::SpreadElement(s) => {
                            let spread = self.eval_expression(&s.argument)?;
                            match spread {
                                Value::Array(inner) => args.extend(inner),
                                other => {
                                    return Err(self.err(format!(
                                        "cannot spread {} into arguments",
                                        other.type_name()
                                    )))
                                }
                            }
                        }
                        other => {
                            let expr = other
                                .as_expression()
                                .ok_or_else(|| self.err("unsupported call argument"))?;
                            args.push(self.eval_expression(expr)?);
                        }
                    }
                }
                builtins::call(f, args, self.env, self.path)
            }
            Expression::StaticMemberExpression(member) => {
                let object = self.eval_expression(&member.object)?;
                self.member(&object, member.property.name.as_str())
            }
            Expression::ComputedMemberExpression(member) => {
                let object = self.eval_expression(&member.object)?;
                let key = self.eval_expression(&member.expression)?;
                match (&object, &key) {
                    // Negative or fractional indices are simply absent keys.
                    (Value::Array(items), Value::Number(n)) => {
                        if *n >= 0.0 && n.fract() == 0.0 {
                            Ok(items
                                .get(*n as usize)
                                .cloned()
                                .unwrap_or(Value::Undefined))
                        } else {
                            Ok(Value::Undefined)
                        }
                    }
                    (_, Value::Str(s)) => self.member(&object, s),
                    _ => Err(self.err(format!(
                        "cannot index {} with {}",
                        object.type_name(),
                        key.type_name()
                    ))),
                }
            }
            Expression::BinaryExpression(bin) => {
                if bin.operator != BinaryOperator::Addition {
                    return Err(self.err(format!(
                        "unsupported binary operator '{}'",
                        bin.operator.as_str()
                    )));
                }
                let left = self.eval_expression(&bin.left)?;
                let right = self.eval_expression(&bin.right)?;
                match (&left, &right) {
                    (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
                    _ => {
                        let a = left.to_css_string().ok_or_else(|| {
                            self.err(format!("cannot concatenate {}", left.type_name()))
                        })?;
                        let b = right.to_css_string().ok_or_else(|| {
                            self.err(format!("cannot concatenate {}", right.type_name()))
                        })?;
                        Ok(Value::Str(format!("{}{}", a, b)))
                    }
                }
            }
            Expression::UnaryExpression(unary) => {
                let operand = self.eval_expression(&unary.argument)?;
                match unary.operator {
                    UnaryOperator::UnaryNegation => match operand {
                        Value::Number(n) => Ok(Value::Number(-n)),
                        other => {
                            Err(self.err(format!("cannot negate {}", other.type_name())))
                        }
                    },
                    UnaryOperator::LogicalNot => Ok(Value::Bool(!operand.is_truthy())),
                    op => Err(self.err(format!("unsupported unary operator '{}'", op.as_str()))),
                }
            }
            Expression::LogicalExpression(logical) => {
                let left = self.eval_expression(&logical.left)?;
                match logical.operator {
                    LogicalOperator::And => {
                        if left.is_truthy() {
                            self.eval_expression(&logical.right)
                        } else {
                            Ok(left)
                        }
                    }
                    LogicalOperator::Or => {
                        if left.is_truthy() {
                            Ok(left)
                        } else {
                            self.eval_expression(&logical.right)
                        }
                    }
                    LogicalOperator::Coalesce => {
                        if left.is_nullish() {
                            self.eval_expression(&logical.right)
                        } else {
                            Ok(left)
                        }
                    }
                }
            }
            Expression::ConditionalExpression(cond) => {
                let test = self.eval_expression(&cond.test)?;
                if test.is_truthy() {
                    self.eval_expression(&cond.consequent)
                } else {
                    self.eval_expression(&cond.alternate)
                }
            }
            Expression::ParenthesizedExpression(paren) => self.eval_expression(&paren.expression),
            // Type-level wrappers evaluate to their inner expression.
            Expression::TSAsExpression(e) => self.eval_expression(&e.expression),
            Expression::TSSatisfiesExpression(e) => self.eval_expression(&e.expression),
            Expression::TSNonNullExpression(e) => self.eval_expression(&e.expression),
            Expression::ArrowFunctionExpression(_) | Expression::FunctionExpression(_) => {
                Err(self.err("function expressions are not supported in styling modules"))
            }
            _ => Err(self.err("unsupported expression")),
        }
    }

    fn eval_property_key(&mut self, key: &PropertyKey<'_>, computed: bool) -> Result<String> {
        if computed {
            let expr = key
                .as_expression()
                .ok_or_else(|| self.err("unsupported computed key"))?;
            let value = self.eval_expression(expr)?;
            return value
                .to_css_string()
                .ok_or_else(|| self.err(format!("{} is not a valid object key", value.type_name())));
        }
        match key {
            PropertyKey::StaticIdentifier(id) => Ok(id.name.to_string()),
            PropertyKey::StringLiteral(s) => Ok(s.value.to_string()),
            PropertyKey::NumericLiteral(n) => Ok(crate::value::format_number(n.value)),
            _ => Err(self.err("unsupported object key")),
        }
    }

    fn member(&self, object: &Value, key: &str) -> Result<Value> {
        match object {
            Value::Object(map) => Ok(map.get(key).cloned().unwrap_or(Value::Undefined)),
            Value::Array(items) if key == "length" => {
                Ok(Value::Number(items.len() as f64))
            }
            other => Err(self.err(format!(
                "cannot read property '{}' of {}",
                key,
                other.type_name()
            ))),
        }
    }

    fn namespace_member(&self, namespace: &Value, name: &str, specifier: &str) -> Result<Value> {
        namespace
            .as_object()
            .and_then(|map| map.get(name))
            .cloned()
            .ok_or_else(|| {
                self.err(format!("'{}' does not export '{}'", specifier, name))
            })
    }
}

fn export_name(name: &ModuleExportName<'_>) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(s) => s.value.to_string(),
    }
}

fn statement_kind(stmt: &Statement<'_>) -> &'static str {
    match stmt {
        Statement::FunctionDeclaration(_) => "function declaration",
        Statement::ClassDeclaration(_) => "class declaration",
        Statement::ForStatement(_)
        | Statement::ForInStatement(_)
        | Statement::ForOfStatement(_)
        | Statement::WhileStatement(_)
        | Statement::DoWhileStatement(_) => "loop",
        Statement::IfStatement(_) => "if statement",
        Statement::TryStatement(_) => "try statement",
        _ => "statement",
    }
}
