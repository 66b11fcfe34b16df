use storerate::core::database::Database;
use storerate::core::error::RatingError;
use storerate::core::time;
use storerate::plugins::aggregate::RatingValue;
use storerate::plugins::guard::{Authenticator, Role};
use storerate::plugins::ratings;
use storerate::plugins::service::RatingService;
use storerate::plugins::stores::{self, NewStore};
use storerate::plugins::users::{self, DirectoryAuthenticator};
use tempfile::tempdir;

fn new_store(name: &str, owner_id: Option<i64>) -> NewStore {
    NewStore {
        name: name.to_string(),
        address: "42 Market Square".to_string(),
        owner_id,
    }
}

#[test]
fn only_admins_create_stores() {
    let tmp = tempdir().unwrap();
    let db = Database::open_in(tmp.path()).unwrap();
    let plain = users::register_user(&db, "plain", Role::User).unwrap();

    let err = stores::create_store(&db, &plain.identity(), &new_store("Grocer", None)).unwrap_err();
    assert!(matches!(err, RatingError::Forbidden(_)));
    assert!(stores::list_stores(&db).unwrap().is_empty());
}

#[test]
fn store_fields_are_validated() {
    let tmp = tempdir().unwrap();
    let db = Database::open_in(tmp.path()).unwrap();
    let admin = users::register_user(&db, "admin", Role::Admin).unwrap().identity();

    let err = stores::create_store(&db, &admin, &new_store("X", None)).unwrap_err();
    assert!(matches!(err, RatingError::InvalidInput(_)));

    let short_address = NewStore {
        name: "Grocer".to_string(),
        address: "1 A".to_string(),
        owner_id: None,
    };
    let err = stores::create_store(&db, &admin, &short_address).unwrap_err();
    assert!(matches!(err, RatingError::InvalidInput(_)));
}

#[test]
fn new_store_starts_with_empty_aggregate_and_promotes_owner() {
    let tmp = tempdir().unwrap();
    let db = Database::open_in(tmp.path()).unwrap();
    let admin = users::register_user(&db, "admin", Role::Admin).unwrap().identity();
    let owner = users::register_user(&db, "olga", Role::User).unwrap();

    let store = stores::create_store(&db, &admin, &new_store("Grocer", Some(owner.id))).unwrap();
    assert_eq!(store.owner_id, Some(owner.id));
    assert_eq!(store.total_ratings, 0);
    assert_eq!(store.average_rating, 0.0);

    let promoted = users::get_user(&db, owner.id).unwrap().unwrap();
    assert_eq!(promoted.role, Role::StoreOwner);
}

#[test]
fn a_user_owns_at_most_one_store() {
    let tmp = tempdir().unwrap();
    let db = Database::open_in(tmp.path()).unwrap();
    let admin = users::register_user(&db, "admin", Role::Admin).unwrap().identity();
    let owner = users::register_user(&db, "olga", Role::StoreOwner).unwrap();

    stores::create_store(&db, &admin, &new_store("Grocer", Some(owner.id))).unwrap();
    let err = stores::create_store(&db, &admin, &new_store("Second", Some(owner.id))).unwrap_err();
    assert!(matches!(err, RatingError::InvalidInput(_)));

    let err = stores::create_store(&db, &admin, &new_store("Ghost", Some(9_999))).unwrap_err();
    assert!(matches!(err, RatingError::NotFound(_)));
}

#[test]
fn deleting_a_store_cascades_its_ratings() {
    let tmp = tempdir().unwrap();
    let db = Database::open_in(tmp.path()).unwrap();
    let svc = RatingService::new(&db);
    let admin = users::register_user(&db, "admin", Role::Admin).unwrap().identity();
    let owner = users::register_user(&db, "olga", Role::StoreOwner).unwrap().identity();
    let rater = users::register_user(&db, "rita", Role::User).unwrap().identity();
    let store = stores::create_store(&db, &admin, &new_store("Grocer", Some(owner.id))).unwrap();
    let rating = svc.submit_rating(&rater, store.id, 4, None).unwrap();

    let err = stores::delete_store(&db, &rater, store.id).unwrap_err();
    assert!(matches!(err, RatingError::Forbidden(_)));

    stores::delete_store(&db, &owner, store.id).unwrap();
    assert!(stores::get_store(&db, store.id).unwrap().is_none());
    assert!(svc.get_user_rating_for_store(&rater, store.id).unwrap().is_none());
    let err = svc.delete_rating(&rater, rating.rating.id).unwrap_err();
    assert!(matches!(err, RatingError::NotFound(_)));
    assert!(svc.list_ratings_for_user(&rater).unwrap().is_empty());
}

#[test]
fn duplicate_pair_insert_is_a_conflict_race() {
    let tmp = tempdir().unwrap();
    let db = Database::open_in(tmp.path()).unwrap();
    let admin = users::register_user(&db, "admin", Role::Admin).unwrap().identity();
    let rater = users::register_user(&db, "rita", Role::User).unwrap().identity();
    let store = stores::create_store(&db, &admin, &new_store("Grocer", None)).unwrap();
    let value = RatingValue::try_from(3).unwrap();

    let err = db
        .transact("test", "rating.double_insert", |tx| {
            let ts = time::now_row_ts();
            ratings::insert(tx, store.id, rater.id, value, None, &ts)?;
            ratings::insert(tx, store.id, rater.id, value, None, &ts)?;
            Ok(())
        })
        .unwrap_err();
    assert!(matches!(err, RatingError::ConflictRace(_)), "{err}");
    assert!(err.is_unique_violation());

    // the first insert was rolled back with the failed unit of work
    let none = db
        .read(|conn| ratings::find_for_pair(conn, store.id, rater.id))
        .unwrap();
    assert!(none.is_none());
}

#[test]
fn directory_authenticator_resolves_known_ids_only() {
    let tmp = tempdir().unwrap();
    let db = Database::open_in(tmp.path()).unwrap();
    let owner = users::register_user(&db, "olga", Role::StoreOwner).unwrap();
    let auth = DirectoryAuthenticator::new(&db);

    let identity = auth.authenticate(&owner.id.to_string()).unwrap();
    assert_eq!(identity.id, owner.id);
    assert_eq!(identity.role, Role::StoreOwner);

    let err = auth.authenticate("not-a-number").unwrap_err();
    assert_eq!(err.status_code(), 401);
    let err = auth.authenticate("424242").unwrap_err();
    assert!(matches!(err, RatingError::Unauthenticated(_)));
}

#[test]
fn usernames_are_validated() {
    let tmp = tempdir().unwrap();
    let db = Database::open_in(tmp.path()).unwrap();
    let err = users::register_user(&db, "   ", Role::User).unwrap_err();
    assert!(matches!(err, RatingError::InvalidInput(_)));
    let err = users::register_user(&db, &"x".repeat(51), Role::User).unwrap_err();
    assert!(matches!(err, RatingError::InvalidInput(_)));
}
