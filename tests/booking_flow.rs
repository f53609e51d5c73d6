use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use ulid::Ulid;

use turnero::agenda::{Agenda, AgendaChange};
use turnero::config::SchedulePolicy;
use turnero::model::*;
use turnero::seed::seed_catalog;
use turnero::store::{AppointmentRepository, ServiceQuery, StaffQuery, Store};
use turnero::wizard::{BookingError, BookingWizard, CustomerData, SlotDelivery, SlotState, Step};

// ── Test infrastructure ──────────────────────────────────────

fn test_journal_path() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("turnero_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir.join("turnero.journal")
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn now() -> NaiveDateTime {
    today().and_time(hm(9, 0))
}

fn customer(name: &str) -> CustomerData {
    CustomerData {
        name: name.into(),
        phone: "1122334455".into(),
        email: "cliente@example.com".into(),
        notes: Some("Prefiere café".into()),
    }
}

async fn seeded_store(path: &PathBuf) -> Arc<Store> {
    let store = Arc::new(Store::open(path).unwrap());
    seed_catalog(&store, now()).await.unwrap();
    store
}

/// Wizard fed from live catalog feeds, the way a booking page would be.
async fn wizard_from_feeds(store: &Arc<Store>) -> BookingWizard {
    let mut services = store.subscribe(ServiceQuery { active_only: true }).unwrap();
    let mut staff = store.subscribe(StaffQuery { active_only: true }).unwrap();
    let mut wizard = BookingWizard::new(SchedulePolicy::default());
    wizard.set_services(services.next().await.unwrap());
    wizard.set_staff(staff.next().await.unwrap());
    wizard
}

fn walk_to_date_time(wizard: &mut BookingWizard, service: &str, barber: &str) {
    let service_id = wizard.services().iter().find(|s| s.name == service).unwrap().id;
    wizard.select_service(service_id).unwrap();
    wizard.next().unwrap();
    let barber_id = wizard.staff().iter().find(|m| m.name == barber).unwrap().id;
    wizard.select_professional(barber_id).unwrap();
    wizard.next().unwrap();
    wizard.select_date(today(), today()).unwrap();
}

// ── Flows ────────────────────────────────────────────────────

#[tokio::test]
async fn booking_shows_up_in_agenda_and_blocks_the_slot() {
    let path = test_journal_path();
    let store = seeded_store(&path).await;
    let mut agenda = Agenda::open(store.clone(), today()).await.unwrap();
    assert!(agenda.entries().is_empty());

    let mut wizard = wizard_from_feeds(&store).await;
    walk_to_date_time(&mut wizard, "Corte y Barba", "Juan Pérez");
    wizard.load_slots(&*store, now()).await.unwrap();
    assert_eq!(wizard.slot_labels().len(), 20);
    wizard.select_time(hm(11, 0)).unwrap();
    assert_eq!(wizard.next(), Ok(Step::Summary));
    let id = wizard.confirm(&*store, customer("Julián Riedinger")).await.unwrap();
    assert_eq!(wizard.step(), Step::Success);

    let change = tokio::time::timeout(Duration::from_secs(2), agenda.refresh())
        .await
        .unwrap();
    assert_eq!(change, Some(AgendaChange::Appointments));
    let entries = agenda.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].appointment.id, id);
    assert_eq!(entries[0].service_name, "Corte y Barba");
    assert_eq!(entries[0].barber_name, "Juan Pérez");
    assert_eq!(entries[0].end, today().and_time(hm(12, 0)));
    assert_eq!(agenda.summary().pending, 1);
    assert_eq!(agenda.summary().expected_revenue, 25_000);

    // A 45-minute service starting 10:30 to 11:30 would overlap the 60-minute booking.
    let mut next_customer = wizard_from_feeds(&store).await;
    walk_to_date_time(&mut next_customer, "Corte Clásico", "Juan Pérez");
    next_customer.load_slots(&*store, now()).await.unwrap();
    let labels = next_customer.slot_labels();
    for taken in ["10:30", "11:00", "11:30"] {
        assert!(!labels.contains(&taken.to_string()), "{taken} should be taken");
    }
    assert!(labels.contains(&"10:00".to_string()));
    assert!(labels.contains(&"12:00".to_string()));

    // Cancelling from the agenda frees the time again.
    agenda.set_status(id, AppointmentStatus::Cancelled).await.unwrap();
    next_customer.load_slots(&*store, now()).await.unwrap();
    assert!(next_customer.slot_labels().contains(&"11:00".to_string()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_customers_only_one_books() {
    let path = test_journal_path();
    let store = seeded_store(&path).await;

    let mut wizards = Vec::new();
    for _ in 0..6 {
        let mut w = wizard_from_feeds(&store).await;
        walk_to_date_time(&mut w, "Corte Clásico", "Carlos Rodríguez");
        w.load_slots(&*store, now()).await.unwrap();
        w.select_time(hm(17, 30)).unwrap();
        w.next().unwrap();
        wizards.push(w);
    }

    let tasks = wizards.into_iter().enumerate().map(|(i, mut w)| {
        let store = store.clone();
        tokio::spawn(async move {
            let result = w.confirm(&store, customer(&format!("cliente {i}"))).await;
            (result, w.step())
        })
    });
    let outcomes: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let winners: Vec<Ulid> = outcomes.iter().filter_map(|(r, _)| r.as_ref().ok().copied()).collect();
    assert_eq!(winners.len(), 1);
    for (result, step) in &outcomes {
        match result {
            Ok(_) => assert_eq!(*step, Step::Success),
            Err(e) => {
                assert_eq!(e, &BookingError::SlotConflict(winners[0]));
                assert_eq!(*step, Step::Summary);
            }
        }
    }
    assert_eq!(store.appointments_on(today()).await.len(), 1);
}

#[tokio::test]
async fn stale_slots_do_not_overwrite_new_selection() {
    let path = test_journal_path();
    let store = seeded_store(&path).await;
    let mut wizard = wizard_from_feeds(&store).await;
    walk_to_date_time(&mut wizard, "Perfilado de Barba", "Juan Pérez");

    let slow = wizard.slot_request().unwrap();
    let slow_fetch = AppointmentRepository::appointments_for_barber_on(&*store, slow.barber_id, slow.day).await;

    // The customer switches professional while the first fetch is in flight.
    wizard.back().unwrap();
    let carlos = wizard.staff().iter().find(|m| m.name == "Carlos Rodríguez").unwrap().id;
    wizard.select_professional(carlos).unwrap();
    wizard.next().unwrap();
    let fresh = wizard.slot_request().unwrap();

    assert_eq!(wizard.receive_slots(slow, slow_fetch, now()), SlotDelivery::Stale);
    assert_eq!(wizard.slots(), &SlotState::Loading);
    let fresh_fetch = AppointmentRepository::appointments_for_barber_on(&*store, fresh.barber_id, fresh.day).await;
    assert_eq!(wizard.receive_slots(fresh, fresh_fetch, now()), SlotDelivery::Applied);
    assert!(matches!(wizard.slots(), SlotState::Ready(slots) if slots.len() == 20));
}

#[tokio::test]
async fn restart_replays_bookings_and_catalog() {
    let path = test_journal_path();
    let id = {
        let store = seeded_store(&path).await;
        let mut wizard = wizard_from_feeds(&store).await;
        walk_to_date_time(&mut wizard, "Corte Clásico", "Juan Pérez");
        wizard.load_slots(&*store, now()).await.unwrap();
        wizard.select_time(hm(14, 0)).unwrap();
        wizard.next().unwrap();
        wizard.confirm(&*store, customer("Ana")).await.unwrap()
    };

    let store = Arc::new(Store::open(&path).unwrap());
    assert_eq!(store.list_services().len(), 3);
    assert_eq!(store.list_staff().len(), 2);
    assert_eq!(seed_catalog(&store, now()).await.unwrap(), 0);

    let appt = store.get_appointment(id).await.unwrap();
    assert_eq!(appt.client_name, "Ana");
    assert_eq!(appt.notes.as_deref(), Some("Prefiere café"));

    // The replayed booking still blocks its time.
    let mut wizard = wizard_from_feeds(&store).await;
    walk_to_date_time(&mut wizard, "Corte Clásico", "Juan Pérez");
    wizard.load_slots(&*store, now()).await.unwrap();
    assert!(!wizard.slot_labels().contains(&"14:00".to_string()));
}
