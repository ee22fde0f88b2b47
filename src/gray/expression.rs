//! Sandboxed boolean predicates for traffic rules.
//!
//! # Responsibilities
//! - Compile rule expressions once, when a document is prepared
//! - Evaluate compiled predicates against request attributes
//!
//! # Design Decisions
//! - Expression-only compilation: statements, assignments, function
//!   definitions and loops fail to compile
//! - Strict variables: only `user` and `app` exist, both read-only constants
//!   at evaluation time. They are declared as plain variables while
//!   compiling so the optimizer cannot fold placeholder values into the AST
//! - The `user` and `app` maps are built at most once per request, and only
//!   when a rule actually reaches its expression step
//! - Hard operation and depth limits bound evaluation time
//! - `eval`, `print` and `debug` are disabled

use rhai::{Array, Dynamic, Engine, Map, Scope, AST, INT};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::gray::attributes::RequestAttributes;

const MAX_OPERATIONS: u64 = 10_000;
const MAX_EXPR_DEPTH: usize = 32;
const MAX_CALL_LEVELS: usize = 8;
const MAX_STRING_SIZE: usize = 64 * 1024;
const MAX_COLLECTION_SIZE: usize = 4096;

/// Errors raised while compiling or running a predicate.
#[derive(Debug, Error)]
pub enum ExpressionError {
    #[error("expression `{source_text}` failed to compile: {message}")]
    Compile { source_text: String, message: String },

    #[error("expression evaluation failed: {0}")]
    Eval(String),

    #[error("expression returned {0}, expected a boolean")]
    NotBoolean(&'static str),
}

/// Engine shared by every predicate compiled from it.
#[derive(Clone)]
pub struct Sandbox {
    engine: Arc<Engine>,
}

impl Sandbox {
    pub fn new() -> Self {
        let mut engine = Engine::new();

        engine.set_max_operations(MAX_OPERATIONS);
        engine.set_max_expr_depths(MAX_EXPR_DEPTH, MAX_EXPR_DEPTH);
        engine.set_max_call_levels(MAX_CALL_LEVELS);
        engine.set_max_string_size(MAX_STRING_SIZE);
        engine.set_max_array_size(MAX_COLLECTION_SIZE);
        engine.set_max_map_size(MAX_COLLECTION_SIZE);

        engine.set_allow_looping(false);
        engine.set_allow_anonymous_fn(false);
        engine.set_allow_statement_expression(false);
        engine.set_strict_variables(true);

        engine.disable_symbol("eval");
        engine.disable_symbol("print");
        engine.disable_symbol("debug");

        Self {
            engine: Arc::new(engine),
        }
    }

    /// Compile an expression into a reusable predicate.
    pub fn compile(&self, source: &str) -> Result<Predicate, ExpressionError> {
        let scope = declaration_scope();
        let ast = self
            .engine
            .compile_expression_with_scope(&scope, source)
            .map_err(|e| ExpressionError::Compile {
                source_text: source.to_string(),
                message: e.to_string(),
            })?;

        Ok(Predicate {
            source: source.to_string(),
            ast: Arc::new(ast),
            engine: self.engine.clone(),
        })
    }
}

impl Default for Sandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox").finish_non_exhaustive()
    }
}

/// A compiled boolean expression.
#[derive(Clone)]
pub struct Predicate {
    source: String,
    ast: Arc<AST>,
    engine: Arc<Engine>,
}

impl Predicate {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against one request.
    pub fn evaluate(&self, attrs: &RequestAttributes) -> Result<bool, ExpressionError> {
        self.evaluate_in(&mut Bindings::new(attrs))
    }

    /// Evaluate against bindings shared with other predicates of the same
    /// request.
    pub fn evaluate_in(&self, bindings: &mut Bindings<'_>) -> Result<bool, ExpressionError> {
        let scope = bindings.scope();
        let value: Dynamic = self
            .engine
            .eval_ast_with_scope(scope, &self.ast)
            .map_err(|e| ExpressionError::Eval(e.to_string()))?;

        value
            .as_bool()
            .map_err(|_| ExpressionError::NotBoolean(value.type_name()))
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.source).finish()
    }
}

/// Per-request variables for predicate evaluation.
///
/// The scope is built on first use and then reused by every predicate
/// evaluated for the same request.
pub struct Bindings<'a> {
    attrs: &'a RequestAttributes,
    scope: Option<Scope<'static>>,
}

impl<'a> Bindings<'a> {
    pub fn new(attrs: &'a RequestAttributes) -> Self {
        Self { attrs, scope: None }
    }

    pub fn attrs(&self) -> &'a RequestAttributes {
        self.attrs
    }

    /// Whether a predicate has needed the scope yet.
    pub fn is_built(&self) -> bool {
        self.scope.is_some()
    }

    fn scope(&mut self) -> &mut Scope<'static> {
        let attrs = self.attrs;
        let scope = self.scope.get_or_insert_with(|| schema_scope(attrs));
        // `user` and `app` only.
        scope.rewind(2);
        scope
    }
}

impl fmt::Debug for Bindings<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("identity", &self.attrs.identity)
            .field("built", &self.is_built())
            .finish()
    }
}

/// `user` and `app` as mutable placeholders, so compilation resolves the
/// names without treating their values as known.
fn declaration_scope() -> Scope<'static> {
    let mut scope = Scope::new();
    scope.push_dynamic("user", Dynamic::from_map(Map::new()));
    scope.push_dynamic("app", Dynamic::from_map(Map::new()));
    scope
}

fn schema_scope(attrs: &RequestAttributes) -> Scope<'static> {
    let mut scope = Scope::new();
    scope.push_constant_dynamic("user", Dynamic::from_map(user_map(attrs)));
    scope.push_constant_dynamic("app", Dynamic::from_map(app_map(attrs)));
    scope
}

fn text(value: &str) -> Dynamic {
    Dynamic::from(value.to_string())
}

fn user_map(attrs: &RequestAttributes) -> Map {
    let account = &attrs.account;
    let account_id = match attrs.identity.parse::<INT>() {
        Ok(id) => Dynamic::from_int(id),
        Err(_) => text(&attrs.identity),
    };
    let template_ids: Array = account.template_ids.iter().map(|id| text(id)).collect();

    let mut user = Map::new();
    user.insert("account_id".into(), account_id);
    user.insert("role".into(), Dynamic::from_int(INT::from(account.role)));
    user.insert("channel".into(), text(&account.channel));
    user.insert("platform".into(), text(&account.platform));
    user.insert("username".into(), text(&account.username));
    user.insert("nickname".into(), text(&account.nickname));
    user.insert("avatar".into(), text(&account.avatar));
    user.insert("phone_num".into(), text(&account.phone_num));
    user.insert("email".into(), text(&account.email));
    user.insert("source".into(), Dynamic::from_int(INT::from(account.source)));
    user.insert("extra".into(), text(&account.extra));
    user.insert(
        "vip_expire_timestamp".into(),
        Dynamic::from_int(INT::from(account.vip_expire_timestamp)),
    );
    user.insert("ctime".into(), Dynamic::from_int(INT::from(account.ctime)));
    user.insert("template_ids".into(), Dynamic::from_array(template_ids));
    user.insert("business".into(), text(&account.business));
    user.insert("union_id".into(), text(&account.union_id));
    user
}

fn app_map(attrs: &RequestAttributes) -> Map {
    let mut app = Map::new();
    app.insert("device".into(), text(&attrs.device));
    app.insert("platform".into(), text(&attrs.platform));
    app.insert("version".into(), text(&attrs.version));
    app.insert("app_type".into(), text(&attrs.app_type));
    app
}
