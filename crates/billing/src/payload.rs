//! Provider payload model, event classification and customer resolution
//!
//! Provider payloads are loosely structured. Order data arrives either wrapped
//! under an `order` object or directly at the top level. The customer object
//! shows up as `Customer` or `customer`. Everything here is tolerant: a
//! missing or mistyped field is "absent", never an error.

use std::fmt;

use serde_json::{Map, Value};

use crate::users::normalize_email;

/// How the order data was laid out in the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadShape {
    /// `{ "order": { ... } }`
    Wrapped,
    /// Order fields at the top level
    Bare,
}

/// Customer fields the core cares about
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomerFields {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub first_name: Option<String>,
}

impl CustomerFields {
    /// Provider first name, or the first word of the full name
    pub fn first_name(&self) -> Option<&str> {
        self.first_name.as_deref().or_else(|| {
            self.full_name
                .as_deref()
                .and_then(|name| name.split_whitespace().next())
        })
    }
}

/// Order fields, each looked up in the wrapped object first and then at the top level
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFields {
    pub order_id: Option<String>,
    pub order_status: Option<String>,
    pub product_name: Option<String>,
    pub customer: Option<CustomerFields>,
    pub subscription_status: Option<String>,
}

/// Parsed inbound webhook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookPayload {
    /// Explicit event name from the outer payload
    pub event: Option<String>,
    pub shape: PayloadShape,
    pub order: OrderFields,
}

const EVENT_KEYS: &[&str] = &["event", "webhook_event_type"];
const CUSTOMER_KEYS: &[&str] = &["Customer", "customer"];
const SUBSCRIPTION_KEYS: &[&str] = &["Subscription", "subscription"];
const PRODUCT_KEYS: &[&str] = &["Product", "product"];

impl WebhookPayload {
    /// Parse a JSON body. Returns `None` for anything that is not a non-empty object.
    pub fn from_value(value: &Value) -> Option<Self> {
        let outer = value.as_object().filter(|o| !o.is_empty())?;
        let wrapped = outer.get("order").and_then(Value::as_object);

        let shape = if wrapped.is_some() {
            PayloadShape::Wrapped
        } else {
            PayloadShape::Bare
        };

        let scopes: Vec<&Map<String, Value>> = wrapped.into_iter().chain(Some(outer)).collect();

        let customer = object_field(&scopes, CUSTOMER_KEYS).map(|c| CustomerFields {
            email: text_field(&[c], &["email"]),
            full_name: text_field(&[c], &["full_name", "name"]),
            first_name: text_field(&[c], &["first_name"]),
        });

        let subscription_status =
            object_field(&scopes, SUBSCRIPTION_KEYS).and_then(|s| text_field(&[s], &["status"]));

        let product_name =
            object_field(&scopes, PRODUCT_KEYS).and_then(|p| text_field(&[p], &["product_name", "name"]));

        Some(Self {
            event: raw_text_field(&[outer], EVENT_KEYS),
            shape,
            order: OrderFields {
                order_id: id_field(&scopes, &["order_id", "id"]),
                order_status: text_field(&scopes, &["order_status"]),
                product_name,
                customer,
                subscription_status,
            },
        })
    }
}

/// First object-valued entry, scanning scopes in order and keys within each scope
fn object_field<'a>(scopes: &[&'a Map<String, Value>], keys: &[&str]) -> Option<&'a Map<String, Value>> {
    scopes
        .iter()
        .flat_map(|scope| keys.iter().filter_map(move |key| scope.get(*key)))
        .find_map(Value::as_object)
}

/// First non-blank string entry (trimmed), same scan order as `object_field`.
/// Values of any other JSON type are skipped.
fn text_field(scopes: &[&Map<String, Value>], keys: &[&str]) -> Option<String> {
    raw_text_field(scopes, keys).map(|s| s.trim().to_string())
}

/// Like `text_field`, but the string is returned untouched
fn raw_text_field(scopes: &[&Map<String, Value>], keys: &[&str]) -> Option<String> {
    scopes
        .iter()
        .flat_map(|scope| keys.iter().filter_map(move |key| scope.get(*key)))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        })
}

/// Identifier entry: a non-blank string or a number
fn id_field(scopes: &[&Map<String, Value>], keys: &[&str]) -> Option<String> {
    scopes
        .iter()
        .flat_map(|scope| keys.iter().filter_map(move |key| scope.get(*key)))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Event vocabulary understood by the core
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    OrderPaid,
    OrderRefunded,
    OrderChargeback,
    SubscriptionCancelled,
    SubscriptionOverdue,
    /// Anything else. Carries the explicit name or raw status for logging.
    Unhandled(String),
}

impl EventKind {
    /// Map an explicit event name, used verbatim
    pub fn from_name(name: &str) -> Self {
        match name {
            "order.paid" => EventKind::OrderPaid,
            "order.refunded" => EventKind::OrderRefunded,
            "order.chargeback" => EventKind::OrderChargeback,
            "subscription.cancelled" => EventKind::SubscriptionCancelled,
            "subscription.overdue" => EventKind::SubscriptionOverdue,
            other => EventKind::Unhandled(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            EventKind::OrderPaid => "order.paid",
            EventKind::OrderRefunded => "order.refunded",
            EventKind::OrderChargeback => "order.chargeback",
            EventKind::SubscriptionCancelled => "subscription.cancelled",
            EventKind::SubscriptionOverdue => "subscription.overdue",
            EventKind::Unhandled(raw) => raw,
        }
    }

    pub fn is_handled(&self) -> bool {
        !matches!(self, EventKind::Unhandled(_))
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which rule produced the classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationSource {
    ExplicitEvent,
    OrderStatus,
    SubscriptionStatus,
    Unclassified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub event: EventKind,
    pub source: ClassificationSource,
}

/// Classify a payload. First match wins:
/// explicit event name, then order status, then subscription status.
pub fn classify(payload: &WebhookPayload) -> Classification {
    if let Some(name) = payload.event.as_deref() {
        return Classification {
            event: EventKind::from_name(name),
            source: ClassificationSource::ExplicitEvent,
        };
    }

    let order_status = payload.order.order_status.as_deref();
    let derived = order_status.and_then(|status| match status.to_lowercase().as_str() {
        "paid" => Some(EventKind::OrderPaid),
        "refunded" => Some(EventKind::OrderRefunded),
        "chargeback" => Some(EventKind::OrderChargeback),
        "cancelled" | "canceled" => Some(EventKind::SubscriptionCancelled),
        _ => None,
    });
    if let Some(event) = derived {
        return Classification {
            event,
            source: ClassificationSource::OrderStatus,
        };
    }

    let subscription_status = payload.order.subscription_status.as_deref();
    if subscription_status.is_some_and(|s| s.eq_ignore_ascii_case("overdue")) {
        return Classification {
            event: EventKind::SubscriptionOverdue,
            source: ClassificationSource::SubscriptionStatus,
        };
    }

    let raw = order_status.or(subscription_status).unwrap_or("unknown");
    Classification {
        event: EventKind::Unhandled(raw.to_string()),
        source: ClassificationSource::Unclassified,
    }
}

/// Classified event plus extracted identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub classification: Classification,
    /// Normalized (trimmed, lowercased) customer email
    pub customer_email: Option<String>,
    pub customer: CustomerFields,
}

impl Resolution {
    pub fn event(&self) -> &EventKind {
        &self.classification.event
    }
}

/// Resolve identity and event. Never fails; missing data is `None`.
pub fn resolve(payload: &WebhookPayload) -> Resolution {
    let customer = payload.order.customer.clone().unwrap_or_default();
    let customer_email = customer.email.as_deref().and_then(normalize_email);

    Resolution {
        classification: classify(payload),
        customer_email,
        customer,
    }
}
