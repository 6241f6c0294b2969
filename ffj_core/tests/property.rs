use std::sync::Arc;
use std::time::Duration;

use ffj_core::dosing::run_dose;
use ffj_core::mocks::{ManualClock, MemStore, NullDisplay, SpyPin, WeightScript};
use ffj_core::{
    AxisCfg, CancelToken, DoseCfg, DoseRun, Ingredient, Interlock, LinearAxis, ProcessFlag, Stage,
    StageStore,
};
use ffj_traits::{BoxError, Motor};
use proptest::prelude::*;

#[derive(Default)]
struct NoopMotor {
    running: bool,
}

impl Motor for NoopMotor {
    fn set_speed(&mut self, _percent: u8) -> Result<(), BoxError> {
        Ok(())
    }
    fn stop(&mut self) -> Result<(), BoxError> {
        self.running = false;
        Ok(())
    }
    fn start(&mut self) -> Result<(), BoxError> {
        self.running = true;
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum StoreOp {
    CommitNext,
    Set(usize, bool),
    Reset,
}

fn store_op() -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        3 => Just(StoreOp::CommitNext),
        2 => (0usize..5, any::<bool>()).prop_map(|(i, v)| StoreOp::Set(i, v)),
        1 => Just(StoreOp::Reset),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

    #[test]
    fn relative_moves_emit_exactly_abs_steps(steps in -400i64..400) {
        let clock = ManualClock::new();
        let pulse = SpyPin::new();
        let mut axis = LinearAxis::new(
            "p",
            Box::new(pulse.clone()),
            Box::new(SpyPin::new()),
            AxisCfg { half_period: Duration::from_micros(5), forward_high: true },
            Arc::new(clock.clone()),
        );
        let mut il = Interlock::new(CancelToken::new());
        axis.move_relative(steps, &mut il).unwrap();
        prop_assert_eq!(pulse.rises(), steps.unsigned_abs());
        prop_assert_eq!(axis.position(), steps);
        prop_assert_eq!(clock.elapsed(), Duration::from_micros(10) * u32::try_from(steps.unsigned_abs()).unwrap());
    }

    #[test]
    fn move_and_move_back_restores_position(
        start in -300i64..300,
        steps in -300i64..300,
        forward_high in any::<bool>(),
    ) {
        let pulse = SpyPin::new();
        let mut axis = LinearAxis::new(
            "p",
            Box::new(pulse.clone()),
            Box::new(SpyPin::new()),
            AxisCfg { half_period: Duration::from_micros(5), forward_high },
            Arc::new(ManualClock::new()),
        );
        let mut il = Interlock::new(CancelToken::new());
        axis.move_relative(start, &mut il).unwrap();
        let before = axis.position();
        let pulses = pulse.rises();

        axis.move_relative(steps, &mut il).unwrap();
        prop_assert_eq!(axis.position(), before + steps);
        axis.move_relative(-steps, &mut il).unwrap();
        prop_assert_eq!(axis.position(), before);
        prop_assert_eq!(pulse.rises() - pulses, 2 * steps.unsigned_abs());
    }

    #[test]
    fn dose_stops_on_first_reading_at_threshold(
        readings in prop::collection::vec(prop::option::weighted(0.8, 0.0f32..1000.0), 1..40)
    ) {
        let mut script: Vec<Option<f32>> = readings;
        script.push(Some(1000.0));
        let expected = script
            .iter()
            .position(|r| r.is_some_and(|g| g >= 500.0))
            .unwrap() + 1;

        let clock = ManualClock::new();
        let weights = WeightScript::readings(&script);
        let mut sensor = weights.sensor();
        let mut motor = NoopMotor::default();
        let cfg = DoseCfg { poll_interval: Duration::from_millis(5), samples: 1, ..DoseCfg::default() };
        let mut run = DoseRun::new(Ingredient::Molasses, &cfg);
        let mut il = Interlock::new(CancelToken::new());
        let (grams, polls) = run_dose(&mut run, &mut motor, &mut sensor, &mut NullDisplay, &clock, &mut il).unwrap();
        prop_assert_eq!(polls as usize, expected);
        prop_assert!(grams >= 500.0);
        prop_assert!(!motor.running);
    }

    #[test]
    fn flags_stay_prefix_closed(ops in prop::collection::vec(store_op(), 1..40)) {
        let mem = MemStore::new();
        let mut store = StageStore::open(Box::new(mem.clone())).unwrap();
        // flags in pipeline order
        let order = [
            ProcessFlag::BananaAdded,
            ProcessFlag::MolassesAdded,
            ProcessFlag::MixtureMixed,
            ProcessFlag::MixtureSealed,
            ProcessFlag::Fermenting,
        ];
        let mut last_seq = store.snapshot().seq;
        for op in ops {
            let _ = match op {
                StoreOp::CommitNext => match store.stage().next() {
                    Some(s) => store.commit(s),
                    None => Ok(()),
                },
                StoreOp::Set(i, v) => store.set_flag(order[i], v),
                StoreOp::Reset => store.reset(),
            };
            let flags: Vec<bool> = order.iter().map(|f| store.flag(*f)).collect();
            for w in flags.windows(2) {
                prop_assert!(w[0] || !w[1], "later flag set without earlier: {:?}", flags);
            }
            prop_assert!(store.snapshot().seq >= last_seq);
            last_seq = store.snapshot().seq;

            let reopened = StageStore::open(Box::new(mem.clone())).unwrap();
            prop_assert_eq!(reopened.snapshot(), store.snapshot());
        }
        prop_assert!(store.stage() >= Stage::Ready);
    }
}
