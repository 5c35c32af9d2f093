//! End-to-end flow over the local core: sign in, resolve handles,
//! run CRUD against both unsharded and sharded kinds, discover shards,
//! wipe.

use atelier_model::{
    Booking, BookingStatus, DocumentMeta, EntityKind, Student,
};
use atelier_store::{
    DocumentStore, Patch, RuntimeContext, Selector, StoreError, UserIdentity,
};
use atelier_util::{current_year, DocumentId};
use std::sync::Arc;

fn new_student(name: &str) -> Student {
    Student {
        meta: DocumentMeta::new(EntityKind::Student),
        name: name.to_string(),
        phone: "5550001".to_string(),
        country_code: "+1".to_string(),
        email: String::new(),
        address: String::new(),
        credits: 10,
        notes: String::new(),
    }
}

fn new_booking(student: &DocumentId, date: &str) -> Booking {
    Booking {
        meta: DocumentMeta::new(EntityKind::Booking),
        student_id: student.clone(),
        class_id: DocumentId::new("class_1_aaaaaaaaa"),
        class_date: date.to_string(),
        class_time: "10:00".to_string(),
        status: BookingStatus::Confirmed,
        credits_used: 1,
        notes: String::new(),
    }
}

#[test]
fn crud_requires_a_signed_in_user() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RuntimeContext::new(dir.path()).unwrap();

    assert!(matches!(
        ctx.handle(EntityKind::Student),
        Err(StoreError::AuthenticationRequired)
    ));

    // The global user database stays reachable for registration.
    assert!(ctx.handle(EntityKind::User).is_ok());
}

#[test]
fn full_document_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RuntimeContext::new(dir.path()).unwrap();
    ctx.sign_in(UserIdentity::new("u1", "Alice"));

    let students: DocumentStore<Student> =
        DocumentStore::new(ctx.handle(EntityKind::Student).unwrap());

    let ada = students.create(new_student("Ada")).unwrap();
    students.create(new_student("Grace")).unwrap();

    let all = students.find_all().unwrap();
    assert_eq!(all.len(), 2);

    let updated = students
        .update(&ada.meta.id, Patch::new().set("credits", 25))
        .unwrap();
    assert_eq!(updated.credits, 25);

    let found = students
        .find_where(&Selector::kind(EntityKind::Student).gte("credits", 20))
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Ada");

    assert!(students.remove(&ada.meta.id).unwrap());
    assert_eq!(students.find_all().unwrap().len(), 1);
}

#[test]
fn bookings_shard_by_class_date_year() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RuntimeContext::new(dir.path()).unwrap();
    ctx.sign_in(UserIdentity::new("u1", "Alice"));

    let student_id = DocumentId::new("student_1_aaaaaaaaa");

    let past: DocumentStore<Booking> = DocumentStore::new(
        ctx.handle_for_date(EntityKind::Booking, "2023-03-10").unwrap(),
    );
    past.create(new_booking(&student_id, "2023-03-10")).unwrap();
    assert_eq!(past.database().name(), "u1_booking_2023");

    let current: DocumentStore<Booking> =
        DocumentStore::new(ctx.handle(EntityKind::Booking).unwrap());
    current
        .create(new_booking(&student_id, "2026-01-05"))
        .unwrap();

    // Shards hold only their own year's documents.
    assert_eq!(past.find_all().unwrap().len(), 1);
    assert_eq!(current.find_all().unwrap().len(), 1);

    let years = ctx.list_shard_years(EntityKind::Booking);
    assert_eq!(years, vec![current_year(), 2023]);
}

#[test]
fn concurrent_resolution_converges_on_one_handle() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = Arc::new(RuntimeContext::new(dir.path()).unwrap());
    ctx.sign_in(UserIdentity::new("u1", "Alice"));

    let mut joins = Vec::new();
    for _ in 0..4 {
        let ctx = Arc::clone(&ctx);
        joins.push(std::thread::spawn(move || {
            ctx.handle(EntityKind::Student).unwrap()
        }));
    }

    let handles: Vec<_> = joins.into_iter().map(|j| j.join().unwrap()).collect();
    for db in &handles[1..] {
        assert!(Arc::ptr_eq(&handles[0], db));
    }
}

#[test]
fn wipe_then_reuse() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = RuntimeContext::new(dir.path()).unwrap();
    ctx.sign_in(UserIdentity::new("u1", "Alice"));

    let students: DocumentStore<Student> =
        DocumentStore::new(ctx.handle(EntityKind::Student).unwrap());
    students.create(new_student("Ada")).unwrap();

    ctx.wipe().unwrap();

    let students: DocumentStore<Student> =
        DocumentStore::new(ctx.handle(EntityKind::Student).unwrap());
    assert!(students.find_all().unwrap().is_empty());
}
