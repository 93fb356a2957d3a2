//! Combat Replay Example
//!
//! Replays a short scripted encounter through the ingestion pipeline and
//! prints what a damage meter would display on every UI refresh.
//!
//! ## What You'll Learn
//!
//! - Building a pipeline with a tracked player and a spell resolver
//! - Subscribing to bus topics
//! - Driving the pipeline with combat start/end and periodic ticks
//! - Reading window totals, peak rate and activity level
//!
//! ## Data Flow
//!
//! ```text
//! RawEvent → classify → accumulate → DAMAGE_OBSERVED
//!                           ↓
//!                tick → UI_REFRESH_TICK → meter
//! ```
//!
//! ## Running the Example
//!
//! ```bash
//! cargo run --example combat_replay
//! ```

use pulsemeter_core::{
    spell_cache::SpellInfo, BusEvent, EngineConfig, MetricExtra, MetricKind, OwnershipFlags,
    PipelineBuilder, RawEvent, Topic,
};

const PLAYER: &str = "Player-1-0A1B2C3D";
const PET: &str = "Pet-0-3771-0-1";

fn resolve_spell(spell_id: u32) -> Option<SpellInfo> {
    let (name, school) = match spell_id {
        133 => ("Fireball", 4),
        17 => ("Bite", 1),
        2061 => ("Flash Heal", 2),
        _ => return None,
    };
    Some(SpellInfo {
        name: name.to_string(),
        icon: format!("icons/{spell_id}.png"),
        school,
    })
}

/// Two casts per second from the player, a pet bite every second and a heal
/// every three seconds
fn scripted_encounter(duration: u32) -> Vec<RawEvent> {
    let mut events = Vec::new();
    for second in 0..duration {
        let t = second as f64;
        for offset in [0.1, 0.6] {
            let crit = (second + (offset * 10.0) as u32) % 5 == 0;
            events.push(
                RawEvent::damage(t + offset, PLAYER, if crit { 2400.0 } else { 1200.0 })
                    .name("Thrall")
                    .flags(OwnershipFlags::me())
                    .spell(133)
                    .critical(crit)
                    .extra(MetricExtra::Damage {
                        absorbed: 0.0,
                        blocked: 0.0,
                        overkill: 0.0,
                        school: 4,
                    }),
            );
        }
        events.push(
            RawEvent::damage(t + 0.3, PET, 350.0)
                .name("Wolf")
                .flags(OwnershipFlags::my_pet())
                .spell(17),
        );
        if second % 3 == 0 {
            events.push(
                RawEvent::healing(t + 0.8, PLAYER, 3000.0)
                    .flags(OwnershipFlags::me())
                    .spell(2061)
                    .extra(MetricExtra::Healing {
                        overhealing: 900.0,
                        absorbed: 0.0,
                    }),
            );
        }
        // Someone else's damage, ignored by a personal meter
        events.push(
            RawEvent::damage(t + 0.5, "Player-2-0F0F0F0F", 5000.0)
                .flags(OwnershipFlags::RAID | OwnershipFlags::TYPE_PLAYER),
        );
    }
    events
}

fn main() {
    println!("Pulsemeter Combat Replay");
    println!("========================\n");

    let mut pipeline = PipelineBuilder::new()
        .config(EngineConfig::default())
        .player(PLAYER, "Thrall")
        .spell_resolver(resolve_spell)
        .build()
        .expect("default configuration is valid");

    pipeline.subscribe(Topic::EntityDetected, "roster", |event| {
        if let BusEvent::EntityDetected(entity) = event {
            println!("  + {} joined as {}", entity.display_name, entity.category.name());
        }
        Ok(())
    });
    pipeline.subscribe(Topic::UiRefreshTick, "meter", |event| {
        if let BusEvent::UiRefreshTick(refresh) = event {
            if let Some(damage) = refresh.metric(MetricKind::Damage) {
                println!(
                    "  [{:>5.1}s] dps {:>7.1}  peak {:>7.1}  total {:>8.0}  crit {:>4.1}%",
                    refresh.timestamp, damage.current_rate, damage.peak_rate, damage.total, damage.crit_pct
                );
            }
        }
        Ok(())
    });

    let duration = 12;
    let events = scripted_encounter(duration);
    println!("Replaying {} events over {duration}s\n", events.len());

    pipeline.combat_start(0.0);
    let mut events = events.into_iter().peekable();
    for second in 1..=duration {
        let now = second as f64;
        while let Some(event) = events.next_if(|e| e.timestamp < now) {
            if let Err(err) = pipeline.ingest(event) {
                eprintln!("ingest failed: {err}");
            }
        }
        pipeline.tick(now);
    }
    pipeline.combat_end(duration as f64);

    // Let the peak decay for a while after combat
    pipeline.tick(duration as f64 + 10.0);

    println!("\nEncounter summary");
    println!("-----------------");
    for kind in MetricKind::ALL {
        let snapshot = pipeline.snapshot(kind).expect("default metrics are registered");
        println!(
            "{kind:>8}: total {:>8.0} (player {:.0}, pet {:.0}), avg {:.1}/s, peak now {:.1}/s, activity {:.2}",
            snapshot.total,
            snapshot.player_total,
            snapshot.pet_total,
            snapshot.average_rate,
            snapshot.peak_rate,
            snapshot.activity
        );
        for (name, value) in snapshot.extras.iter() {
            println!("          {name}: {value:.1}");
        }
    }

    let diagnostics = pipeline.diagnostics();
    println!("\nDiagnostics");
    println!("-----------");
    println!(
        "processed {}, unowned {}, refreshes {}",
        diagnostics.pipeline.processed, diagnostics.pipeline.unowned, diagnostics.pipeline.refreshes
    );
    for pool in &diagnostics.pools {
        println!(
            "pool {:<16} created {:>3}, reused {:>4}, outstanding {}",
            pool.name, pool.created, pool.reused, pool.outstanding
        );
    }
    println!(
        "spell cache: {} hits, {} misses",
        diagnostics.spell_cache.hits, diagnostics.spell_cache.misses
    );
}
