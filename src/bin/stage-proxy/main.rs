//! stage-proxy-cli - Load a layer through a proxy node and report what it sees.

use anyhow::{bail, Context, Result};
use std::env;
use std::sync::Arc;

use stage_proxy::prelude::*;

struct Args {
    file: String,
    unshared: bool,
    time: Option<f64>,
    log: &'static str,
}

fn parse_args() -> Result<Option<Args>> {
    let mut file = None;
    let mut unshared = false;
    let mut time = None;
    let mut log = "info";

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(None),
            "-v" | "--verbose" => log = "debug",
            "-vv" | "--trace" => log = "trace",
            "-q" | "--quiet" => log = "error",
            "--unshared" => unshared = true,
            "--time" | "-t" => {
                let value = args.next().context("--time needs a value")?;
                time = Some(value.parse().with_context(|| format!("bad time '{value}'"))?);
            }
            other if other.starts_with('-') => bail!("unknown option '{other}'"),
            other => {
                if file.replace(other.to_string()).is_some() {
                    bail!("only one layer file may be given");
                }
            }
        }
    }
    let Some(file) = file else {
        return Ok(None);
    };
    Ok(Some(Args { file, unshared, time, log }))
}

fn print_help() {
    println!("stage-proxy-cli - Inspect a layer through a stage proxy node");
    println!(
        "build {} {}",
        env!("STAGE_PROXY_BUILD_DATE"),
        env!("STAGE_PROXY_BUILD_TIME")
    );
    println!();
    println!("USAGE:");
    println!("    stage-proxy-cli [OPTIONS] <layer.json>");
    println!();
    println!("OPTIONS:");
    println!("    --unshared        Give the node a private stage");
    println!("    -t, --time <T>    Evaluation time (default 0)");
    println!("    -v, --verbose     Show debug output");
    println!("    -vv, --trace      Show trace output");
    println!("    -q, --quiet       Only show errors");
    println!("    -h, --help        Show this help");
}

fn main() -> Result<()> {
    let Some(args) = parse_args()? else {
        print_help();
        return Ok(());
    };
    stage_proxy::init_tracing_with(args.log);

    let config = ProxyConfig::load_default();
    let graph = Arc::new(DagGraph::new());
    let node = graph.create_node("stageProxy", None)?;
    let shape = ProxyShape::new(graph.clone(), node, config);

    shape.set_file_path(&args.file)?;
    shape.set_share_stage(!args.unshared)?;
    if let Some(t) = args.time {
        shape.set_time(TimeCode::new(t))?;
    }

    let data = shape.out_stage_data()?;
    let Some(stage) = data.stage.clone() else {
        bail!("could not open a stage for '{}'", args.file);
    };
    let cache_id = shape.out_stage_cache_id()?;

    println!("Node:        {}", shape.path_string());
    println!("Root layer:  {}", stage.root_layer().identifier());
    println!("Share mode:  {:?}", shape.share_mode());
    println!("Cache id:    {}", cache_id.to_i64());
    println!("Layers:");
    for id in stage.layer_identifiers() {
        println!("    {id}");
    }

    let prims = stage.prim_paths();
    println!("Prims ({}):", prims.len());
    for path in &prims {
        let type_name = stage.type_name(path).unwrap_or_default();
        let indent = "  ".repeat(path.depth().saturating_sub(1));
        if type_name.is_empty() {
            println!("    {indent}{}", path.name());
        } else {
            println!("    {indent}{} ({type_name})", path.name());
        }
    }

    let bbox = shape.bounding_box();
    if bbox.is_empty() {
        println!("Bounds:      empty");
    } else {
        println!("Bounds:      {:?} - {:?}", bbox.min.to_array(), bbox.max.to_array());
    }
    println!("Time:        {}", shape.out_time()?);
    println!("Stage ver:   {}", shape.usd_stage_version());
    println!("Updates:     {}", shape.update_counter());
    println!("Resyncs:     {}", shape.resync_counter());
    Ok(())
}
