// Tests for admission control: feasibility, backtracking, queues and zones
#[cfg(test)]
mod tests {
    use crate::core::admission::{DurationFn, WorkItem, WorkItemPhase};
    use crate::core::builder::TopologyBuilder;
    use crate::core::execution::config::SimulationConfig;
    use crate::core::model::Model;
    use crate::core::resources::{Booking, RoleWindow};
    use crate::core::simulation_engine::NoopListener;
    use crate::core::types::{ActivityId, ElementId, ManagerId, ResourceTypeId};
    use std::sync::Arc;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn model(builder: TopologyBuilder, config: SimulationConfig) -> Model {
        Model::new(builder.build().unwrap(), &config, Arc::new(NoopListener))
    }

    fn item(model: &Model, element: u64, activity: ActivityId, arrival: u64) -> Arc<WorkItem> {
        model
            .create_work_item(ElementId::new(element), activity, arrival)
            .unwrap()
    }

    fn assert_quiescent(model: &Model) {
        for resource in model.resources() {
            assert_eq!(resource.entry().booking(), Booking::Free, "{} still booked", resource.name());
            assert_eq!(resource.entry().booked_for(), None);
        }
        for resource_type in model.resource_types() {
            assert_eq!(resource_type.simple_available(), resource_type.capacity());
        }
        assert_eq!(model.zones().zone_count(), 0);
    }

    /// r1 serves X and Y, r2 serves X only; one X and one Y are needed and
    /// there is no simple capacity. First-fit gives r1 to X and strands Y.
    fn backtracking_topology() -> (TopologyBuilder, ResourceTypeId, ResourceTypeId, ActivityId) {
        let mut builder = TopologyBuilder::new();
        let am = builder.add_manager("yard").unwrap();
        let x = builder.add_resource_type("X", am, 0).unwrap();
        let y = builder.add_resource_type("Y", am, 0).unwrap();
        builder
            .add_resource("r1", vec![RoleWindow::new(x, 0, 100), RoleWindow::new(y, 0, 100)])
            .unwrap();
        builder.add_resource("r2", vec![RoleWindow::new(x, 0, 100)]).unwrap();
        let act = builder.add_activity("lift", 0).unwrap();
        builder
            .add_work_group(act, &[(x, 1), (y, 1)], DurationFn::Fixed(5), 0)
            .unwrap();
        (builder, x, y, act)
    }

    #[test]
    fn test_backtracking_finds_the_only_assignment() {
        init_logging();
        let (builder, x, y, act) = backtracking_topology();
        let model = model(builder, SimulationConfig::new());
        let manager = model.manager(ManagerId::new(0)).unwrap();

        let wi = item(&model, 1, act, 0);
        let admission = manager.request(&model, Arc::clone(&wi), 0).unwrap().unwrap();
        assert_eq!(admission.duration, 5);
        assert_eq!(wi.phase(), WorkItemPhase::ResourcesCaught);

        let caught = wi.caught();
        let names = |rt: ResourceTypeId| -> Vec<String> {
            caught
                .iter()
                .filter(|c| c.resource_type == rt)
                .flat_map(|c| c.entries.iter().map(|r| r.name().to_string()))
                .collect()
        };
        assert_eq!(names(x), vec!["r2".to_string()]);
        assert_eq!(names(y), vec!["r1".to_string()]);

        let release = manager.finish(&model, &wi, 5).unwrap();
        assert!(release.held);
        assert_quiescent(&model);
    }

    #[test]
    fn test_search_budget_exhaustion_is_infeasible() {
        init_logging();
        let (builder, _x, _y, act) = backtracking_topology();
        let model = model(builder, SimulationConfig::new().with_search_budget(1));
        let manager = model.manager(ManagerId::new(0)).unwrap();

        let wi = item(&model, 1, act, 0);
        assert!(manager.request(&model, Arc::clone(&wi), 0).unwrap().is_none());
        assert_eq!(wi.phase(), WorkItemPhase::Queued);
        assert_eq!(manager.queued(), vec![wi.id()]);
        for resource in model.resources() {
            assert_eq!(resource.entry().booking(), Booking::Free);
        }
    }

    #[test]
    fn test_overlapping_roles_split_across_types() {
        init_logging();
        let mut builder = TopologyBuilder::new();
        let am = builder.add_manager("yard").unwrap();
        let x = builder.add_resource_type("X", am, 0).unwrap();
        let y = builder.add_resource_type("Y", am, 0).unwrap();
        for name in ["a", "b"] {
            builder
                .add_resource(name, vec![RoleWindow::new(x, 0, 10), RoleWindow::new(y, 0, 10)])
                .unwrap();
        }
        let act = builder.add_activity("pair", 0).unwrap();
        builder
            .add_work_group(act, &[(x, 1), (y, 1)], DurationFn::Fixed(3), 0)
            .unwrap();
        let model = model(builder, SimulationConfig::new());
        let manager = model.manager(am).unwrap();

        let first = item(&model, 1, act, 0);
        assert!(manager.request(&model, Arc::clone(&first), 0).unwrap().is_some());
        let held: Vec<String> = first
            .caught()
            .iter()
            .flat_map(|c| c.entries.iter().map(|r| r.name().to_string()))
            .collect();
        assert_eq!(held.len(), 2);
        assert_ne!(held[0], held[1]);

        // Both roles are spent on the first item
        let second = item(&model, 2, act, 0);
        assert!(manager.request(&model, Arc::clone(&second), 0).unwrap().is_none());

        let release = manager.finish(&model, &first, 3).unwrap();
        assert_eq!(release.admitted.len(), 1);
        assert_eq!(release.admitted[0].work_item.id(), second.id());
        assert!(release.notify.is_empty());
    }

    #[test]
    fn test_simple_capacity_is_conserved_across_admissions() {
        init_logging();
        let mut builder = TopologyBuilder::new();
        let am = builder.add_manager("desk").unwrap();
        let clerk = builder.add_resource_type("clerk", am, 3).unwrap();
        let act = builder.add_activity("serve", 0).unwrap();
        builder
            .add_work_group(act, &[(clerk, 2)], DurationFn::Fixed(1), 0)
            .unwrap();
        let model = model(builder, SimulationConfig::new());
        let manager = model.manager(am).unwrap();
        let resource_type = model.resource_type(clerk).unwrap();

        let items: Vec<_> = (0..4).map(|n| item(&model, n, act, n)).collect();
        let mut admitted = Vec::new();
        for wi in &items {
            if let Some(admission) = manager.request(&model, Arc::clone(wi), 0).unwrap() {
                admitted.push(admission.work_item);
            }
            let outstanding: usize = admitted
                .iter()
                .flat_map(|wi| wi.caught())
                .map(|c| c.count())
                .sum();
            assert_eq!(resource_type.simple_available() + outstanding, 3);
        }
        assert_eq!(admitted.len(), 1);
        assert_eq!(manager.queue_len(), 3);

        // Each release admits exactly the next queued item
        let mut now = 1;
        while let Some(holder) = admitted.pop() {
            let release = manager.finish(&model, &holder, now).unwrap();
            admitted.extend(release.admitted.into_iter().map(|a| a.work_item));
            now += 1;
        }
        assert_eq!(manager.queue_len(), 0);
        assert_quiescent(&model);
    }

    #[test]
    fn test_work_groups_tried_in_priority_order() {
        init_logging();
        let mut builder = TopologyBuilder::new();
        let am = builder.add_manager("clinic").unwrap();
        let nurse = builder.add_resource_type("nurse", am, 1).unwrap();
        let doctor = builder.add_resource_type("doctor", am, 1).unwrap();
        let act = builder.add_activity("consult", 0).unwrap();
        let by_doctor = builder
            .add_work_group(act, &[(doctor, 1)], DurationFn::Fixed(10), 1)
            .unwrap();
        let by_nurse = builder
            .add_work_group(act, &[(nurse, 1)], DurationFn::Fixed(20), 0)
            .unwrap();
        let model = model(builder, SimulationConfig::new());
        let manager = model.manager(am).unwrap();

        let first = manager.request(&model, item(&model, 1, act, 0), 0).unwrap().unwrap();
        assert_eq!(first.work_group, by_nurse);
        let second = manager.request(&model, item(&model, 2, act, 0), 0).unwrap().unwrap();
        assert_eq!(second.work_group, by_doctor);
        assert!(manager.request(&model, item(&model, 3, act, 0), 0).unwrap().is_none());
    }

    #[test]
    fn test_queue_order_follows_activity_priority_then_arrival() {
        init_logging();
        let mut builder = TopologyBuilder::new();
        let am = builder.add_manager("port").unwrap();
        let crane = builder.add_resource_type("crane", am, 0).unwrap();
        let routine = builder.add_activity("routine", 5).unwrap();
        let urgent = builder.add_activity("urgent", 1).unwrap();
        for act in [routine, urgent] {
            builder
                .add_work_group(act, &[(crane, 1)], DurationFn::Fixed(1), 0)
                .unwrap();
        }
        let model = model(builder, SimulationConfig::new());
        let manager = model.manager(am).unwrap();

        let late_routine = item(&model, 1, routine, 9);
        let early_routine = item(&model, 2, routine, 3);
        let late_urgent = item(&model, 3, urgent, 7);
        for wi in [&late_routine, &early_routine, &late_urgent] {
            assert!(manager.request(&model, Arc::clone(wi), wi.arrival()).unwrap().is_none());
        }
        assert_eq!(
            manager.queued(),
            vec![late_urgent.id(), early_routine.id(), late_routine.id()]
        );

        // Finishing a queued item withdraws it
        let release = manager.finish(&model, &early_routine, 10).unwrap();
        assert!(!release.held);
        assert_eq!(manager.queued(), vec![late_urgent.id(), late_routine.id()]);
    }

    #[test]
    fn test_concurrent_overlapping_requests_resolve() {
        init_logging();
        const THREADS: u64 = 8;
        const ROUNDS: u64 = 50;

        // Every resource straddles both managers, so every pair of checks
        // touches a shared entry
        let mut builder = TopologyBuilder::new();
        let west = builder.add_manager("west").unwrap();
        let east = builder.add_manager("east").unwrap();
        let x = builder.add_resource_type("X", west, 1).unwrap();
        let y = builder.add_resource_type("Y", east, 0).unwrap();
        for n in 0..4 {
            builder
                .add_resource(
                    &format!("r{}", n),
                    vec![RoleWindow::new(x, 0, 1000), RoleWindow::new(y, 0, 1000)],
                )
                .unwrap();
        }
        let on_x = builder.add_activity("on-x", 0).unwrap();
        let on_y = builder.add_activity("on-y", 0).unwrap();
        builder
            .add_work_group(on_x, &[(x, 3)], DurationFn::Fixed(1), 0)
            .unwrap();
        builder
            .add_work_group(on_y, &[(y, 2)], DurationFn::Fixed(1), 0)
            .unwrap();
        let model = model(builder, SimulationConfig::new());

        std::thread::scope(|scope| {
            for thread in 0..THREADS {
                let model = &model;
                scope.spawn(move || {
                    let activity = if thread % 2 == 0 { on_x } else { on_y };
                    let manager = model
                        .manager(model.activity(activity).unwrap().manager())
                        .unwrap();
                    for round in 0..ROUNDS {
                        let wi = item(model, thread * ROUNDS + round, activity, 0);
                        let _ = manager.request(model, Arc::clone(&wi), 0).unwrap();
                        let release = manager.finish(model, &wi, 0).unwrap();
                        for admitted in release.admitted {
                            manager.finish(model, &admitted.work_item, 0).unwrap();
                        }
                    }
                });
            }
        });

        for manager in model.managers() {
            let leftovers = manager.reevaluate(&model, 0).unwrap();
            for admitted in leftovers {
                manager.finish(&model, &admitted.work_item, 0).unwrap();
            }
            assert_eq!(manager.queue_len(), 0);
        }
        assert_quiescent(&model);
    }
}
