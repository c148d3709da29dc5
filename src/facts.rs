//! Facts: per-node properties other than children
//!
//! A node's flat fact list (styles, DOM properties, attributes, namespaced
//! attributes, event handlers) is bucketed once at construction into the
//! typed [`Facts`] struct. [`diff_facts`] compares two of them category by
//! category and yields a [`FactsDiff`], or `None` when nothing changed.
//!
//! Removal sentinels:
//! - styles: empty string
//! - properties: `""` if the old value was a string, `null` otherwise
//! - attributes / namespaced attributes / events: `None`
//!
//! Author: Moroya Sakamoto

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::error::DecodeError;
use crate::node::Message;

// ── Decoders ───────────────────────────────────────────────────────────

type DecodeFn<T> = Rc<dyn Fn(&Value) -> Result<T, DecodeError>>;

/// Constant a decoder always yields, compared by value.
#[derive(Clone)]
struct Constant {
    value: Rc<dyn Any>,
    eq: fn(&dyn Any, &dyn Any) -> bool,
}

fn equal_as<M: PartialEq + 'static>(a: &dyn Any, b: &dyn Any) -> bool {
    match (a.downcast_ref::<M>(), b.downcast_ref::<M>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

impl Constant {
    fn new<M: PartialEq + 'static>(value: Rc<M>) -> Self {
        Self {
            value,
            eq: equal_as::<M>,
        }
    }

    fn same_as(&self, other: &Constant) -> bool {
        (self.eq)(&*self.value, &*other.value)
    }
}

/// Turns a native event payload into a value.
///
/// Two decoders are equal if they share the same function, if both carry
/// the same non-empty description, or if both always succeed with equal
/// constants.
pub struct Decoder<T> {
    description: Option<Rc<str>>,
    constant: Option<Constant>,
    run: DecodeFn<T>,
}

impl<T> Clone for Decoder<T> {
    fn clone(&self) -> Self {
        Self {
            description: self.description.clone(),
            constant: self.constant.clone(),
            run: self.run.clone(),
        }
    }
}

impl Decoder<Message> {
    /// Ignore the payload and yield a clone of `message`.
    pub fn succeed<M: Clone + PartialEq + 'static>(message: M) -> Self {
        let message = Rc::new(message);
        let constant = Constant::new(message.clone());
        Self {
            description: None,
            constant: Some(constant),
            run: Rc::new(move |_| Ok(Box::new((*message).clone()) as Message)),
        }
    }
}

impl<T> Decoder<T> {
    pub fn new(run: impl Fn(&Value) -> Result<T, DecodeError> + 'static) -> Self {
        Self {
            description: None,
            constant: None,
            run: Rc::new(run),
        }
    }

    /// Decoder with a structural description. Decoders with equal
    /// descriptions are treated as interchangeable by the fact differ.
    pub fn described(
        description: &str,
        run: impl Fn(&Value) -> Result<T, DecodeError> + 'static,
    ) -> Self {
        Self {
            description: (!description.is_empty()).then(|| Rc::from(description)),
            constant: None,
            run: Rc::new(run),
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[inline]
    pub fn decode(&self, event: &Value) -> Result<T, DecodeError> {
        (self.run)(event)
    }

    pub fn same_as(&self, other: &Decoder<T>) -> bool {
        if Rc::ptr_eq(&self.run, &other.run) {
            return true;
        }
        match (&self.description, &other.description) {
            (Some(a), Some(b)) => return a == b,
            (None, None) => {}
            _ => return false,
        }
        match (&self.constant, &other.constant) {
            (Some(a), Some(b)) => a.same_as(b),
            _ => false,
        }
    }
}

impl<T> fmt::Debug for Decoder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(d) => write!(f, "Decoder({d:?})"),
            None => write!(f, "Decoder({:p})", Rc::as_ptr(&self.run) as *const ()),
        }
    }
}

/// Follow `path` through nested JSON objects.
pub fn at<'v>(event: &'v Value, path: &[&str]) -> Result<&'v Value, DecodeError> {
    path.iter()
        .try_fold(event, |v, key| v.get(key))
        .ok_or_else(|| DecodeError::missing(path))
}

/// Decode the string at `path`.
pub fn string_at(event: &Value, path: &[&str]) -> Result<String, DecodeError> {
    at(event, path)?
        .as_str()
        .map(str::to_owned)
        .ok_or_else(|| DecodeError::expected("a string", path))
}

/// Decode the boolean at `path`.
pub fn bool_at(event: &Value, path: &[&str]) -> Result<bool, DecodeError> {
    at(event, path)?
        .as_bool()
        .ok_or_else(|| DecodeError::expected("a bool", path))
}

// ── Handlers ───────────────────────────────────────────────────────────

/// Result of a `Custom` handler's decoder.
pub struct CustomDecoded {
    pub message: Message,
    pub stop_propagation: bool,
    pub prevent_default: bool,
}

/// What a handler's decoder may ask of the host besides dispatching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Normal,
    MayStopPropagation,
    MayPreventDefault,
    Custom,
}

/// Event handler: a kind plus a decoder of the matching shape.
#[derive(Clone)]
pub enum Handler {
    Normal(Decoder<Message>),
    MayStopPropagation(Decoder<(Message, bool)>),
    MayPreventDefault(Decoder<(Message, bool)>),
    Custom(Decoder<CustomDecoded>),
}

/// Normalised decoder output.
pub struct Decoded {
    pub message: Message,
    pub stop_propagation: bool,
    pub prevent_default: bool,
}

impl Handler {
    pub fn kind(&self) -> HandlerKind {
        match self {
            Handler::Normal(_) => HandlerKind::Normal,
            Handler::MayStopPropagation(_) => HandlerKind::MayStopPropagation,
            Handler::MayPreventDefault(_) => HandlerKind::MayPreventDefault,
            Handler::Custom(_) => HandlerKind::Custom,
        }
    }

    /// Handlers that can never call `preventDefault` may be registered passive.
    pub fn is_passive(&self) -> bool {
        matches!(
            self.kind(),
            HandlerKind::Normal | HandlerKind::MayStopPropagation
        )
    }

    /// Same kind and equal decoders.
    pub fn same_as(&self, other: &Handler) -> bool {
        match (self, other) {
            (Handler::Normal(a), Handler::Normal(b)) => a.same_as(b),
            (Handler::MayStopPropagation(a), Handler::MayStopPropagation(b)) => a.same_as(b),
            (Handler::MayPreventDefault(a), Handler::MayPreventDefault(b)) => a.same_as(b),
            (Handler::Custom(a), Handler::Custom(b)) => a.same_as(b),
            _ => false,
        }
    }

    pub fn decode(&self, event: &Value) -> Result<Decoded, DecodeError> {
        Ok(match self {
            Handler::Normal(d) => Decoded {
                message: d.decode(event)?,
                stop_propagation: false,
                prevent_default: false,
            },
            Handler::MayStopPropagation(d) => {
                let (message, stop) = d.decode(event)?;
                Decoded {
                    message,
                    stop_propagation: stop,
                    prevent_default: false,
                }
            }
            Handler::MayPreventDefault(d) => {
                let (message, prevent) = d.decode(event)?;
                Decoded {
                    message,
                    stop_propagation: false,
                    prevent_default: prevent,
                }
            }
            Handler::Custom(d) => {
                let c = d.decode(event)?;
                Decoded {
                    message: c.message,
                    stop_propagation: c.stop_propagation,
                    prevent_default: c.prevent_default,
                }
            }
        })
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Normal(d) => f.debug_tuple("Normal").field(d).finish(),
            Handler::MayStopPropagation(d) => f.debug_tuple("MayStopPropagation").field(d).finish(),
            Handler::MayPreventDefault(d) => f.debug_tuple("MayPreventDefault").field(d).finish(),
            Handler::Custom(d) => f.debug_tuple("Custom").field(d).finish(),
        }
    }
}

// ── Sanitisation ───────────────────────────────────────────────────────

/// Neutralise script injection through tags, attribute names and URLs.
pub mod sanitize {
    /// `script` elements render as `p`.
    pub fn no_script(tag: &str) -> &str {
        if tag == "script" {
            "p"
        } else {
            tag
        }
    }

    /// Inline handler attributes (`on*`) and `formAction` become `data-*`.
    pub fn no_on_or_form_action(key: &str) -> String {
        let lower = key.to_ascii_lowercase();
        if lower.starts_with("on") || lower == "formaction" {
            format!("data-{key}")
        } else {
            key.to_owned()
        }
    }

    /// `innerHTML` and `formAction` properties become `data-*`.
    pub fn no_inner_html_or_form_action(key: &str) -> String {
        if key == "innerHTML" || key == "formAction" {
            format!("data-{key}")
        } else {
            key.to_owned()
        }
    }

    /// `javascript:` and `data:text/html` URLs are blanked.
    pub fn no_javascript_or_html_uri(value: &str) -> &str {
        let trimmed = value.trim_start().to_ascii_lowercase();
        if trimmed.starts_with("javascript:") || trimmed.starts_with("data:text/html") {
            ""
        } else {
            value
        }
    }
}

// ── Fact list ──────────────────────────────────────────────────────────

/// One entry of a node's flat fact list.
#[derive(Clone, Debug)]
pub enum Fact {
    Event { name: String, handler: Handler },
    Style { key: String, value: String },
    Property { key: String, value: Value },
    Attribute { key: String, value: String },
    AttributeNs { namespace: String, key: String, value: String },
}

impl Fact {
    pub fn style(key: &str, value: &str) -> Self {
        Fact::Style {
            key: key.to_owned(),
            value: value.to_owned(),
        }
    }

    pub fn property(key: &str, value: impl Into<Value>) -> Self {
        Fact::Property {
            key: sanitize::no_inner_html_or_form_action(key),
            value: value.into(),
        }
    }

    pub fn attribute(key: &str, value: &str) -> Self {
        Fact::Attribute {
            key: sanitize::no_on_or_form_action(key),
            value: sanitize::no_javascript_or_html_uri(value).to_owned(),
        }
    }

    pub fn attribute_ns(namespace: &str, key: &str, value: &str) -> Self {
        Fact::AttributeNs {
            namespace: namespace.to_owned(),
            key: sanitize::no_on_or_form_action(key),
            value: sanitize::no_javascript_or_html_uri(value).to_owned(),
        }
    }

    pub fn on(name: &str, handler: Handler) -> Self {
        Fact::Event {
            name: name.to_owned(),
            handler,
        }
    }

    /// Shorthand for a `Normal` handler that always yields a clone of
    /// `message`. Rebuilt handlers with equal messages diff as unchanged.
    pub fn on_message<M: Clone + PartialEq + 'static>(name: &str, message: M) -> Self {
        Fact::on(name, Handler::Normal(Decoder::succeed(message)))
    }
}

/// Namespaced attribute value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NsValue {
    pub namespace: String,
    pub value: String,
}

/// Facts bucketed by category. Empty maps mean "category absent".
#[derive(Clone, Debug, Default)]
pub struct Facts {
    pub events: BTreeMap<String, Handler>,
    pub styles: BTreeMap<String, String>,
    pub properties: BTreeMap<String, Value>,
    pub attributes: BTreeMap<String, String>,
    pub ns_attributes: BTreeMap<String, NsValue>,
}

fn add_class(existing: Option<&String>, class: &str) -> String {
    match existing {
        Some(c) if !c.is_empty() => format!("{c} {class}"),
        _ => class.to_owned(),
    }
}

impl Facts {
    /// Bucket a flat fact list. Later entries win, except `class`
    /// attributes and `className` properties, which accumulate.
    pub fn organize(list: Vec<Fact>) -> Self {
        let mut facts = Facts::default();
        for fact in list {
            match fact {
                Fact::Event { name, handler } => {
                    facts.events.insert(name, handler);
                }
                Fact::Style { key, value } => {
                    facts.styles.insert(key, value);
                }
                Fact::Property { key, value } => {
                    let value = match (key.as_str(), &value) {
                        ("className", Value::String(class)) => match facts.properties.get(&key) {
                            Some(Value::String(prev)) => {
                                Value::String(add_class(Some(prev), class))
                            }
                            _ => value,
                        },
                        _ => value,
                    };
                    facts.properties.insert(key, value);
                }
                Fact::Attribute { key, value } => {
                    let value = if key == "class" {
                        add_class(facts.attributes.get(&key), &value)
                    } else {
                        value
                    };
                    facts.attributes.insert(key, value);
                }
                Fact::AttributeNs {
                    namespace,
                    key,
                    value,
                } => {
                    facts.ns_attributes.insert(key, NsValue { namespace, value });
                }
            }
        }
        facts
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
            && self.styles.is_empty()
            && self.properties.is_empty()
            && self.attributes.is_empty()
            && self.ns_attributes.is_empty()
    }

    /// Everything in `self`, as a diff against an empty fact set.
    pub fn to_initial_diff(&self) -> FactsDiff {
        diff_facts(&Facts::default(), self).unwrap_or_default()
    }
}

// ── Fact diff ──────────────────────────────────────────────────────────

/// Changed facts, keyed by property name per category.
#[derive(Clone, Debug, Default)]
pub struct FactsDiff {
    pub events: BTreeMap<String, Option<Handler>>,
    /// Empty string means "remove".
    pub styles: BTreeMap<String, String>,
    pub properties: BTreeMap<String, Value>,
    pub attributes: BTreeMap<String, Option<String>>,
    pub ns_attributes: BTreeMap<String, (String, Option<String>)>,
}

impl FactsDiff {
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of changed entries across categories.
    pub fn len(&self) -> usize {
        self.events.len()
            + self.styles.len()
            + self.properties.len()
            + self.attributes.len()
            + self.ns_attributes.len()
    }
}

/// Properties whose live value can drift from the virtual one (user input).
pub(crate) fn is_live_property(key: &str) -> bool {
    key == "value" || key == "checked"
}

/// Generic per-category diff. `removed` builds the sentinel for a key that
/// disappeared, `unchanged` decides equality for keys present on both sides.
fn diff_category<V, D>(
    old: &BTreeMap<String, V>,
    new: &BTreeMap<String, V>,
    out: &mut BTreeMap<String, D>,
    removed: impl Fn(&V) -> D,
    added: impl Fn(&V) -> D,
    unchanged: impl Fn(&str, &V, &V) -> bool,
) {
    for (key, old_value) in old {
        match new.get(key) {
            None => {
                out.insert(key.clone(), removed(old_value));
            }
            Some(new_value) if unchanged(key, old_value, new_value) => {}
            Some(new_value) => {
                out.insert(key.clone(), added(new_value));
            }
        }
    }
    for (key, new_value) in new {
        if !old.contains_key(key) {
            out.insert(key.clone(), added(new_value));
        }
    }
}

/// Diff two fact sets. `None` if no category changed.
pub fn diff_facts(old: &Facts, new: &Facts) -> Option<FactsDiff> {
    let mut diff = FactsDiff::default();

    diff_category(
        &old.events,
        &new.events,
        &mut diff.events,
        |_| None,
        |h| Some(h.clone()),
        |_, a, b| a.same_as(b),
    );
    diff_category(
        &old.styles,
        &new.styles,
        &mut diff.styles,
        |_| String::new(),
        Clone::clone,
        |_, a, b| a == b,
    );
    diff_category(
        &old.properties,
        &new.properties,
        &mut diff.properties,
        |v| match v {
            Value::String(_) => Value::String(String::new()),
            _ => Value::Null,
        },
        Clone::clone,
        |key, a, b| a == b && !is_live_property(key),
    );
    diff_category(
        &old.attributes,
        &new.attributes,
        &mut diff.attributes,
        |_| None,
        |v| Some(v.clone()),
        |_, a, b| a == b,
    );
    diff_category(
        &old.ns_attributes,
        &new.ns_attributes,
        &mut diff.ns_attributes,
        |v| (v.namespace.clone(), None),
        |v| (v.namespace.clone(), Some(v.value.clone())),
        |_, a, b| a == b,
    );

    (!diff.is_empty()).then_some(diff)
}
