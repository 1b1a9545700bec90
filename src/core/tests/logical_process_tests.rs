// Tests for the logical process clock, barrier and dispatch regimes
#[cfg(test)]
mod tests {
    use crate::core::errors::KernelError;
    use crate::core::event::{Event, EventKind};
    use crate::core::execution::config::{DispatchMode, SimulationConfig};
    use crate::core::execution::logical_process::{EventContext, EventExecutor, LogicalProcess};
    use crate::core::types::SimTime;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Barrier, Mutex};

    /// Runs flow-layer callbacks and ignores every other event kind
    struct CallbackExecutor;

    impl EventExecutor for CallbackExecutor {
        fn execute(&self, event: Event, ctx: &mut EventContext<'_>) -> Result<(), KernelError> {
            match event.into_kind() {
                EventKind::Callback(callback) => callback(ctx),
                _ => Ok(()),
            }
        }
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn lp(config: SimulationConfig) -> LogicalProcess<CallbackExecutor> {
        LogicalProcess::new(CallbackExecutor, &config).unwrap()
    }

    #[test]
    fn test_same_timestamp_events_run_together() {
        init_logging();
        let lp = lp(SimulationConfig::new().with_end_time(100).with_thread_pool_size(2));
        let seen = Arc::new(Mutex::new(Vec::new()));
        // Both events must be running at once for the barrier to open
        let rendezvous = Arc::new(Barrier::new(2));

        let (seen_outer, rendezvous_outer) = (Arc::clone(&seen), Arc::clone(&rendezvous));
        lp.schedule(Event::callback(10, None, move |ctx| {
            for _ in 0..2 {
                let seen = Arc::clone(&seen_outer);
                let rendezvous = Arc::clone(&rendezvous_outer);
                ctx.schedule_callback(50, None, move |ctx| {
                    rendezvous.wait();
                    seen.lock().unwrap().push(ctx.now());
                    Ok(())
                })?;
            }
            Ok(())
        }))
        .unwrap();

        let summary = lp.run().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![50, 50]);
        assert_eq!(summary.final_time, 100);
        assert_eq!(summary.events_executed, 3);
        assert_eq!(summary.events_beyond_end, 0);
    }

    #[test]
    fn test_advance_waits_for_the_full_batch() {
        init_logging();
        let lp = lp(SimulationConfig::new().with_end_time(100));
        for time in [30, 20, 20, 40] {
            lp.schedule(Event::callback(time, None, |_| Ok(()))).unwrap();
        }
        assert_eq!(lp.pending(), 5);

        assert_eq!(lp.advance().unwrap(), 20);
        lp.wait_idle();
        assert_eq!(lp.in_flight(), 0);
        assert_eq!(lp.events_executed(), 2);
        assert_eq!(lp.pending(), 3);

        assert_eq!(lp.advance().unwrap(), 30);
        lp.wait_idle();
        assert_eq!(lp.now(), 30);
    }

    #[test]
    fn test_scheduling_into_the_past_is_rejected() {
        init_logging();
        let lp = lp(SimulationConfig::new().with_end_time(100));
        lp.schedule(Event::callback(20, None, |_| Ok(()))).unwrap();
        lp.advance().unwrap();
        lp.wait_idle();

        let err = lp.schedule(Event::callback(10, None, |_| Ok(()))).unwrap_err();
        assert!(matches!(
            err,
            KernelError::CausalityViolation {
                event_time: 10,
                lvt: 20
            }
        ));
    }

    #[test]
    fn test_causality_violation_in_event_aborts_run() {
        init_logging();
        let lp = lp(SimulationConfig::new().with_end_time(100));
        lp.schedule(Event::callback(40, None, |ctx| {
            ctx.schedule_callback(ctx.now() - 5, None, |_| Ok(()))
        }))
        .unwrap();
        lp.schedule(Event::callback(90, None, |_| Ok(()))).unwrap();

        let err = lp.run().unwrap_err();
        match &err {
            KernelError::Aborted { snapshot, .. } => {
                assert_eq!(snapshot.lvt, 40);
                assert_eq!(snapshot.in_flight, 0);
                assert_eq!(snapshot.pending, vec![90, 100]);
            }
            other => panic!("expected an abort, got {:?}", other),
        }
        assert!(matches!(
            err.root_cause(),
            KernelError::CausalityViolation {
                event_time: 35,
                lvt: 40
            }
        ));
    }

    #[test]
    fn test_worker_panic_aborts_instead_of_hanging() {
        init_logging();
        let lp = lp(SimulationConfig::new().with_end_time(100));
        lp.schedule(Event::callback(5, None, |_| panic!("model bug"))).unwrap();
        lp.schedule(Event::callback(5, None, |_| Ok(()))).unwrap();

        let err = lp.run().unwrap_err();
        match err.root_cause() {
            KernelError::WorkerPanic { time, message } => {
                assert_eq!(*time, 5);
                assert!(message.contains("model bug"));
            }
            other => panic!("expected a worker panic, got {:?}", other),
        }
    }

    /// Whether a same-instant follow-on ran inside the tick that produced it,
    /// and the time of the next advance
    fn chained_event(mode: DispatchMode) -> (bool, SimTime) {
        let lp = lp(SimulationConfig::new()
            .with_end_time(100)
            .with_dispatch_mode(mode));
        let chained = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&chained);
        lp.schedule(Event::callback(10, None, move |ctx| {
            ctx.schedule_callback(ctx.now(), None, move |ctx| {
                assert_eq!(ctx.now(), 10);
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
        }))
        .unwrap();

        lp.advance().unwrap();
        lp.wait_idle();
        let within_tick = chained.load(Ordering::SeqCst);

        let next = lp.advance().unwrap();
        lp.wait_idle();
        assert!(chained.load(Ordering::SeqCst));
        (within_tick, next)
    }

    #[test]
    fn test_direct_dispatch_drains_same_instant_chain() {
        init_logging();
        assert_eq!(chained_event(DispatchMode::Direct), (true, 100));
    }

    #[test]
    fn test_buffered_dispatch_defers_to_next_advance() {
        init_logging();
        // The buffered follow-on gets its own tick at the same timestamp
        assert_eq!(chained_event(DispatchMode::Buffered), (false, 10));
    }

    /// Whether a same-instant follow-on produced at the end time ran, and how
    /// many events the run left behind
    fn follow_on_at_end_time(mode: DispatchMode) -> (bool, usize) {
        let lp = lp(SimulationConfig::new()
            .with_end_time(50)
            .with_dispatch_mode(mode));
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        lp.schedule(Event::callback(50, None, move |ctx| {
            ctx.schedule_callback(ctx.now(), None, move |_| {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
        }))
        .unwrap();

        let summary = lp.run().unwrap();
        assert_eq!(summary.final_time, 50);
        (ran.load(Ordering::SeqCst), summary.events_beyond_end)
    }

    #[test]
    fn test_end_time_follow_on_depends_on_dispatch_mode() {
        init_logging();
        // Direct drains it inside the final tick; buffered dispatch would
        // need another tick, which the end time forbids
        assert_eq!(follow_on_at_end_time(DispatchMode::Direct), (true, 0));
        assert_eq!(follow_on_at_end_time(DispatchMode::Buffered), (false, 1));
    }

    #[test]
    fn test_events_beyond_end_are_left_queued() {
        init_logging();
        let lp = lp(SimulationConfig::new().with_end_time(50));
        let ran = Arc::new(Mutex::new(Vec::<SimTime>::new()));
        for time in [10, 60, 70] {
            let ran = Arc::clone(&ran);
            lp.schedule(Event::callback(time, None, move |ctx| {
                ran.lock().unwrap().push(ctx.now());
                Ok(())
            }))
            .unwrap();
        }
        let summary = lp.run().unwrap();
        assert_eq!(*ran.lock().unwrap(), vec![10]);
        assert_eq!(summary.final_time, 50);
        assert_eq!(summary.events_beyond_end, 2);
    }
}
