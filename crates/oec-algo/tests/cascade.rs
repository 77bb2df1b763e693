use oec_algo::mpc::{delivered_power_setpoints, flow_demands, wind_farm_setpoints};
use oec_algo::*;
use oec_core::{ClusterConfig, WindFarmState};

fn small_cascade(config: &ClusterConfig) -> Cascade {
    let scheduler = SchedulerMpc::build(config, 3.0, 3, 1).unwrap();
    let wind_farm = WindFarmMpc::build(config, 6.0, 4, 1).unwrap();
    let platforms = [
        PlatformMpc::build(config, 2.0, 4, 2).unwrap(),
        PlatformMpc::build(config, 2.0, 4, 2).unwrap(),
    ];
    Cascade::new(config, scheduler, wind_farm, platforms, 0.5).unwrap()
}

#[test]
fn test_boards_start_empty() {
    let cascade = small_cascade(&ClusterConfig::default());
    assert!(cascade.schedule_board().latest().is_none());
    assert!(cascade.delivery_board().latest().is_none());
    assert_eq!(cascade.wind_farm().x()[WindFarmState::Soc.index()], 0.5);
    assert_eq!(cascade.targets(), CascadeTargets::default());
}

#[test]
fn test_run_ticks_every_layer_outer_first() {
    let config = ClusterConfig::default();
    let mut cascade = small_cascade(&config).with_targets(CascadeTargets {
        volume: [0.3, 0.3],
        soc: 0.5,
    });

    let ticks = cascade.run(&[10.0, 11.0]).unwrap();
    assert_eq!(ticks.len(), 2);
    for (i, tick) in ticks.iter().enumerate() {
        assert_eq!(tick.tick, i);
        assert_eq!(tick.platforms.len(), 2);
        assert_eq!(tick.scheduler.as_ref().unwrap().layer, "scheduler");
        assert_eq!(tick.wind_farm.as_ref().unwrap().layer, "wind_farm");
    }

    // whatever each layer published is exactly what the conversions give for
    // its latest fresh plan
    let last = ticks.iter().rev().find_map(|t| t.scheduler.as_ref()?.plan.as_ref());
    if let Some(plan) = last {
        let schedule = cascade.schedule_board().latest().unwrap();
        assert_eq!(schedule.wind_farm, wind_farm_setpoints(plan));
        assert_eq!(schedule.flow_demand, flow_demands(plan));
    }
    let last = ticks.iter().rev().find_map(|t| t.wind_farm.as_ref()?.plan.as_ref());
    if let Some(plan) = last {
        let delivery = cascade.delivery_board().latest().unwrap();
        assert_eq!(delivery.delivered, delivered_power_setpoints(plan, &config.grid));
    }

    // the scheduler measures the battery on the wind-farm plant
    let soc = cascade.wind_farm().x()[WindFarmState::Soc.index()];
    assert!(soc.is_finite());
    assert!(cascade.scheduler().x()[0].is_finite());
}

#[test]
fn test_outer_layers_tick_on_their_periods() {
    let mut config = ClusterConfig::default();
    config.cascade.scheduler_period = 3;
    config.cascade.wind_farm_period = 2;
    let mut cascade = small_cascade(&config);
    assert_eq!(cascade.periods().scheduler_period, 3);

    let ticks = cascade.run(&[10.0; 7]).unwrap();
    let ran = |pick: fn(&CascadeTick) -> bool| -> Vec<usize> {
        ticks.iter().filter(|t| pick(t)).map(|t| t.tick).collect()
    };
    assert_eq!(ran(|t| t.scheduler.is_some()), vec![0, 3, 6]);
    assert_eq!(ran(|t| t.wind_farm.is_some()), vec![0, 2, 4, 6]);
    assert!(ticks.iter().all(|t| t.platforms.len() == 2));

    let skipped = serde_json::to_value(&ticks[1]).unwrap();
    assert!(skipped.get("scheduler").is_none());
    assert!(skipped.get("wind_farm").is_none());
    assert_eq!(skipped["platforms"].as_array().unwrap().len(), 2);
}

#[test]
fn test_platforms_see_published_setpoints() {
    let config = ClusterConfig::default();
    let mut cascade = small_cascade(&config);
    cascade.delivery_board().publish(oec_algo::mpc::DeliverySetpoints { delivered: [0.0, 0.0] });
    cascade.schedule_board().publish(oec_algo::mpc::ScheduleSetpoints::default());

    // zero setpoints on a platform at rest: nothing to do
    let reports = cascade.tick_platforms().unwrap();
    for report in reports {
        assert_eq!(report.status, Some(SolveStatus::Optimal));
        assert!(!report.held);
        assert!(report.state.iter().all(|x| x.abs() < 1e-6));
    }
}
