//! Typed documents
//!
//! Every persisted record shares the same metadata envelope (`_id`,
//! `_rev`, `type`, `created_at`, `updated_at`); each entity kind adds
//! its own explicit field schema on top. The generic CRUD layer is
//! generic over [`Entity`] rather than duck-typing shapes at runtime.

use atelier_util::{timestamp, DocumentId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::EntityKind;

/// Store metadata carried by every document, local and over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMeta {
    #[serde(rename = "_id")]
    pub id: DocumentId,

    /// Store-assigned revision token. `None` until first persisted.
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    /// Kind discriminator. Immutable after creation.
    #[serde(rename = "type")]
    pub kind: EntityKind,

    /// RFC 3339, stamped once at creation. Immutable.
    pub created_at: String,

    /// RFC 3339, rewritten on every update.
    pub updated_at: String,
}

impl DocumentMeta {
    /// Fresh metadata for a new document of the given kind:
    /// generated id, `created_at == updated_at`, no revision yet.
    pub fn new(kind: EntityKind) -> Self {
        let now = timestamp();
        Self {
            id: DocumentId::generate(kind.as_str()),
            rev: None,
            kind,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// A persistable document of one fixed entity kind.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    const KIND: EntityKind;

    fn meta(&self) -> &DocumentMeta;
    fn meta_mut(&mut self) -> &mut DocumentMeta;
}

macro_rules! impl_entity {
    ($ty:ty, $kind:expr) => {
        impl Entity for $ty {
            const KIND: EntityKind = $kind;

            fn meta(&self) -> &DocumentMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut DocumentMeta {
                &mut self.meta
            }
        }
    };
}

/// Account role, as provisioned by the (external) auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Teacher,
    Admin,
}

/// Per-account presentation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSettings {
    pub language: String,
    pub timezone: String,
    pub currency: String,
}

/// An account record in the shared global user database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub username: String,
    pub password_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub phone: String,
    pub country_code: String,
    pub role: UserRole,
    pub display_name: String,
    pub settings: UserSettings,
}

impl_entity!(User, EntityKind::User);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub country_code: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub address: String,
    pub credits: i64,
    #[serde(default)]
    pub notes: String,
}

impl_entity!(Student, EntityKind::Student);

/// A purchasable credit package.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Package {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub credits: i64,
    pub duration_days: i64,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_custom: Option<bool>,
}

impl_entity!(Package, EntityKind::Package);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudentPackageStatus {
    Active,
    Expired,
    Completed,
}

/// A package purchased by a student, with its remaining credit balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentPackage {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub student_id: DocumentId,
    pub package_id: DocumentId,
    pub credits_purchased: i64,
    pub credits_remaining: i64,
    pub purchase_date: String,
    pub expiry_date: String,
    pub status: StudentPackageStatus,
    #[serde(default)]
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_price: Option<f64>,
}

impl_entity!(StudentPackage, EntityKind::StudentPackage);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassType {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub duration_minutes: i64,
    pub active: bool,
}

impl_entity!(ClassType, EntityKind::ClassType);

/// A scheduled class occurrence students can book into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Class {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub class_type_id: DocumentId,
    pub location_id: DocumentId,
    #[serde(default)]
    pub instructor: String,
    pub start_date: String,
    pub start_time: String,
    pub end_time: String,
    pub max_students: i64,
    pub price: f64,
    pub active: bool,
}

impl_entity!(Class, EntityKind::Class);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

/// One student booked into one class on one date. Year-sharded on
/// `class_date`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub student_id: DocumentId,
    pub class_id: DocumentId,
    pub class_date: String,
    pub class_time: String,
    pub status: BookingStatus,
    pub credits_used: i64,
    #[serde(default)]
    pub notes: String,
}

impl_entity!(Booking, EntityKind::Booking);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Payment,
    Refund,
    CreditPurchase,
    CreditUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    Credit,
}

/// A money or credit movement. Year-sharded on `transaction_date`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub student_id: DocumentId,
    pub amount: f64,
    pub transaction_type: TransactionType,
    pub payment_method: PaymentMethod,
    pub transaction_date: String,
    #[serde(default)]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_id: Option<DocumentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package_id: Option<DocumentId>,
}

impl_entity!(Transaction, EntityKind::Transaction);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    #[serde(flatten)]
    pub meta: DocumentMeta,
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub active: bool,
}

impl_entity!(Location, EntityKind::Location);
