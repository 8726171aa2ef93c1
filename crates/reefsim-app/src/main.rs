use anyhow::{Context, Result};
use reefsim_core::{
    FishActions, FishSenses, FishType, PlantType, ReefConfig, World,
};
use tracing::info;

fn main() -> Result<()> {
    init_tracing();
    let ticks = tick_budget()?;
    let mut world = bootstrap_world()?;
    info!(ticks, "Starting reef simulation shell");
    run(&mut world, ticks);
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn tick_budget() -> Result<u64> {
    match std::env::args().nth(1) {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("tick count argument is not a number: {raw}")),
        None => Ok(3_600),
    }
}

fn bootstrap_world() -> Result<World> {
    let config = ReefConfig {
        world_width: 6_000.0,
        world_height: 6_000.0,
        temperature: 0.8,
        rng_seed: Some(0x5EA5_1DE5),
        ..ReefConfig::default()
    };
    let plant_types = vec![
        PlantType::named("kelp"),
        PlantType {
            growth_probability: 0.01,
            max_branches: 5,
            branch_distance: 35.0,
            mobility_factor: 0.2,
            is_coral: true,
            node_color: [230, 120, 90],
            chain_color: [200, 90, 70],
            ..PlantType::named("staghorn")
        },
    ];
    let fish_types = vec![FishType::herbivore("grazer"), FishType::predator("reef shark")];
    let mut world = World::new(config, plant_types, fish_types)?;
    seed_reef(&mut world);
    Ok(world)
}

fn seed_reef(world: &mut World) {
    let spacing = 400.0;
    for row in 0..5 {
        for col in 0..5 {
            let x = (col as f32 - 2.0) * spacing;
            let y = (row as f32 - 2.0) * spacing;
            world.spawn_plant(x, y, (row + col) % 2);
        }
    }
    for i in 0..24 {
        let angle = i as f32 / 24.0 * std::f32::consts::TAU;
        let fish_type = usize::from(i % 6 == 0);
        world.spawn_fish(angle.cos() * 1_500.0, angle.sin() * 1_500.0, fish_type);
    }
}

/// Hand-rolled reactive swimmer: chase the target vector, flee stronger
/// threats, bite when close. Stands in for a learned policy.
fn reactive(view: FishSenses<'_>) -> FishActions {
    let s = view.sensors;
    let fleeing = s[6] > 0.0;
    let (dir_x, dir_y) = if fleeing { (-s[4], -s[5]) } else { (s[0], s[1]) };
    let turn = dir_y.atan2(dir_x.max(0.05)) / std::f32::consts::PI;
    let eat = if !fleeing && s[3] < 0.08 { 1.0 } else { 0.0 };
    [turn.clamp(-1.0, 1.0), 0.7, eat]
}

fn run(world: &mut World, ticks: u64) {
    let mut policy = reactive;
    for _ in 0..ticks {
        world.step(&mut policy);
        if world.tick().0 % 600 == 0 {
            if let Some(summary) = world.history().back() {
                info!(
                    tick = summary.tick.0,
                    plants = summary.plant_nodes,
                    fish = summary.fish_count,
                    predators = summary.predator_count,
                    corpses = summary.corpse_count,
                    mean_reward = summary.mean_reward,
                    "Reef census",
                );
            }
        }
    }
    let totals = world.totals();
    info!(
        growth_events = totals.growth_events,
        kills = totals.kills,
        births = totals.births,
        deaths = totals.deaths_from_age,
        balance = totals.environmental_balance(),
        "Run complete",
    );
}
