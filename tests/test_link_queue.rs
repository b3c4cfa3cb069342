use macros::integration_test;
use rust_qsim_core::simulation::controller::ThreadLocalComputationalEnvironment;
use rust_qsim_core::simulation::events::utils::EventsCollector;
use rust_qsim_core::simulation::events::{LinkLeaveEvent, PersonStuckEvent};
use rust_qsim_core::simulation::network::link::LinkQueue;
use rust_qsim_core::test_utils::{create_link_queue, create_vehicle};

/// Updates the flow capacity, advances the link and empties the buffer, as if the downstream node
/// took every vehicle. Returns the number of vehicles which passed the buffer.
fn step_and_drain(
    link: &mut LinkQueue,
    now: u32,
    env: &mut ThreadLocalComputationalEnvironment,
) -> usize {
    link.update_flow_capacity_credit();
    link.advance_one_tick(now, env);
    let mut moved = 0;
    while link.is_offering_vehicle() {
        link.pop_first_vehicle(now, env);
        moved += 1;
    }
    moved
}

#[integration_test(rust_qsim_core)]
fn vehicles_leave_after_free_flow_travel_time() {
    let mut env = ThreadLocalComputationalEnvironment::default();
    let collector = EventsCollector::register(&mut env.events_publisher_borrow_mut());
    // 100m at 10m/s, 1 veh/s, storage for 13 vehicles
    let mut link = create_link_queue("l1", 100., 10., 3600., 1.);
    assert!(link.storage_capacity() >= 10.);

    for now in 0..30 {
        if now < 5 {
            assert!(link.is_accepting_from_upstream(now));
            let vehicle = create_vehicle(&format!("v{now}"), vec!["l1", "l2"]);
            link.admit_from_upstream(vehicle, now, &mut env);
        }
        step_and_drain(&mut link, now, &mut env);
    }

    let leave_times: Vec<_> = collector
        .of_type(LinkLeaveEvent::TYPE)
        .iter()
        .map(|e| (e.vehicle.clone(), e.time))
        .collect();
    let expected: Vec<_> = (0..5).map(|i| (format!("v{i}"), 10 + i)).collect();
    assert_eq!(expected, leave_times);
    assert_eq!(0, link.veh_count());
}

#[integration_test(rust_qsim_core)]
fn half_a_vehicle_per_second() {
    let mut env = ThreadLocalComputationalEnvironment::default();
    let mut link = create_link_queue("l1", 100., 10., 1800., 1.);
    assert_eq!(0.5, link.flow_capacity_per_time_step());

    let mut passed_at = Vec::new();
    for now in 0..1100 {
        if link.is_accepting_from_upstream(now) {
            let vehicle = create_vehicle(&format!("v{now}"), vec!["l1", "l2"]);
            link.admit_from_upstream(vehicle, now, &mut env);
        }
        if step_and_drain(&mut link, now, &mut env) > 0 {
            passed_at.push(now);
        }
    }

    let in_window = passed_at.iter().filter(|t| (100..1100).contains(*t)).count();
    assert_eq!(500, in_window);
    // congested link: every other time step
    assert!(passed_at.windows(2).all(|w| w[1] - w[0] == 2), "{passed_at:?}");
}

#[integration_test(rust_qsim_core)]
fn clear_reports_every_vehicle_as_stuck() {
    let mut env = ThreadLocalComputationalEnvironment::default();
    let collector = EventsCollector::register(&mut env.events_publisher_borrow_mut());
    let mut link = create_link_queue("l1", 100., 10., 3600., 1.);
    for i in 0..3 {
        let vehicle = create_vehicle(&format!("v{i}"), vec!["l1", "l2"]);
        link.admit_from_upstream(vehicle, i, &mut env);
    }

    assert_eq!(3, link.clear(5, &mut env));

    let stuck = collector.of_type(PersonStuckEvent::TYPE);
    assert_eq!(3, stuck.len());
    assert!(stuck.iter().all(|e| e.time == 5 && e.link == "l1"));
    assert!(link.is_accepting_from_upstream(5));
    assert!(!link.is_active());
}
