//! Scene composer binary: builds a heightmap and object placements from a
//! scene description.
//!
//! Usage: cargo run --release --bin compose_scene -- --scene <FILE> [OPTIONS]
//!
//! Options:
//!   --scene <FILE>    Scene description JSON (required)
//!   --out <DIR>       Output directory (default: "output")
//!   --seed <SEED>     Override the placement seed
//!   --rules <FILE>    Placement rules JSON (overrides the scene's rules)
//!   --jobs <N>        Rayon worker threads (default: all cores)
//!
//! Output structure:
//!   <out>/
//!     heightmap.png       # 16-bit grayscale heightmap
//!     placements.json     # Placed objects + batch report

use std::path::{Path, PathBuf};

use serde_json::json;

use mapscape::composition::{ComposedScene, SceneDescription, compose};
use mapscape::core::types::Result;
use mapscape::placement::RuleSet;

fn main() {
    mapscape::core::logging::init();

    let args: Vec<String> = std::env::args().collect();
    let Some(scene_path) = parse_str_arg(&args, "--scene") else {
        eprintln!("Usage: compose_scene --scene <FILE> [--out <DIR>] [--seed <SEED>] [--rules <FILE>] [--jobs <N>]");
        std::process::exit(2);
    };
    let out_dir = PathBuf::from(parse_str_arg(&args, "--out").unwrap_or_else(|| "output".to_string()));

    if let Some(jobs) = parse_usize_arg(&args, "--jobs") {
        if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(jobs).build_global() {
            log::warn!("Could not configure thread pool: {}", e);
        }
    }

    if let Err(e) = run(Path::new(&scene_path), &out_dir, &args) {
        log::error!("Scene composition failed ({}): {}", e.kind(), e);
        std::process::exit(1);
    }
}

fn run(scene_path: &Path, out_dir: &Path, args: &[String]) -> Result<()> {
    let mut scene = SceneDescription::load_json(scene_path)?;
    if let Some(seed) = parse_u64_arg(args, "--seed") {
        scene.placement.seed = seed;
    }
    if let Some(rules_path) = parse_str_arg(args, "--rules") {
        scene.rules = Some(RuleSet::load_json(Path::new(&rules_path))?);
    }

    println!("=== Mapscape Scene Composer ===");
    println!("Scene:      {}", scene_path.display());
    println!("Resolution: {} x {}", scene.width, scene.height);
    println!("World:      {} x {} (height {})", scene.world_size.x, scene.world_size.y, scene.height_scale);
    println!("Features:   {}", scene.analysis.features.len());
    println!("Objects:    {}", scene.analysis.objects.len());
    println!("Output:     {}", out_dir.display());
    println!();

    let composed = compose(&scene)?;
    write_outputs(out_dir, &composed)?;

    let report = &composed.report;
    println!("Modifications applied: {}", composed.modifications_applied);
    println!("Objects placed:        {}/{}", report.placed, report.total);
    if report.failed > 0 {
        println!("Failed:");
        for (object_type, count) in &report.failures_by_type {
            println!("  {:<20} {}", object_type, count);
        }
    }
    println!("Done in {:.1}ms", report.elapsed.as_secs_f64() * 1000.0);
    Ok(())
}

fn write_outputs(out_dir: &Path, composed: &ComposedScene) -> Result<()> {
    std::fs::create_dir_all(out_dir)?;
    composed.heightmap.save_image(&out_dir.join("heightmap.png"))?;

    let placements = json!({
        "objects": composed.records,
        "report": composed.report,
    });
    std::fs::write(out_dir.join("placements.json"), serde_json::to_string_pretty(&placements)?)?;
    Ok(())
}

fn parse_u64_arg(args: &[String], flag: &str) -> Option<u64> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
