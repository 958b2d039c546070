use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::process;

use a2c_core::pkt;
use a2c_core::save::{SaveFile, convert};
use clap::Parser;

#[derive(Debug, Parser)]
#[command(version, about = "Convert a2c save files to their decoded form")]
struct Cli {
    /// Input save, or an item package with --pkt.
    #[arg(value_name = "SAVE.A2C")]
    path: PathBuf,
    /// Destination for the converted save. Defaults to output.bin.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Print the decoded character stats instead of converting.
    #[arg(long)]
    stats: bool,
    /// Render results as JSON.
    #[arg(long)]
    json: bool,
    /// Treat the input as a .pkt item package and list its items.
    #[arg(long)]
    pkt: bool,
}

fn open_input(path: &PathBuf) -> BufReader<File> {
    let file = File::open(path).unwrap_or_else(|e| {
        eprintln!("Error reading {}: {e}", path.display());
        process::exit(2);
    });
    BufReader::new(file)
}

fn stats_pairs(save: &SaveFile) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (i, score) in save.stats.scores.iter().enumerate() {
        pairs.push((format!("score{i}"), score.to_string()));
    }
    pairs.push(("gold".into(), save.stats.gold.to_string()));
    for (i, stat) in save.stats.stats.iter().enumerate() {
        pairs.push((format!("stat{i}"), stat.to_string()));
    }
    for (i, spell) in save.stats.spells.iter().enumerate() {
        pairs.push((format!("spell{i}"), spell.to_string()));
    }
    for (i, exp) in save.stats.exp.iter().enumerate() {
        pairs.push((format!("exp{i}"), exp.to_string()));
    }
    pairs
}

fn print_package(cli: &Cli) {
    let package = pkt::parse_package(open_input(&cli.path)).unwrap_or_else(|e| {
        eprintln!("Error parsing item package {}: {e}", cli.path.display());
        process::exit(1);
    });

    let items = package.sorted_items();
    if cli.json {
        let rendered = serde_json::to_string_pretty(&items).unwrap_or_else(|e| {
            eprintln!("Error rendering JSON output: {e}");
            process::exit(1);
        });
        println!("{rendered}");
        return;
    }

    println!("### {} Items ###", items.len());
    for item in &items {
        let mods: String = item
            .modifiers
            .iter()
            .map(|(kind, value)| format!(", {kind}-{value}"))
            .collect();
        println!(
            "Item #{}, Q:{} M:{}, Price: {}{mods}",
            item.recipe_id, item.quality, item.material_id, item.price
        );
    }
}

fn print_stats(cli: &Cli) {
    let save = SaveFile::parse(open_input(&cli.path)).unwrap_or_else(|e| {
        eprintln!("Error parsing save file {}: {e}", cli.path.display());
        process::exit(1);
    });

    if cli.json {
        let rendered = serde_json::to_string_pretty(&save.stats).unwrap_or_else(|e| {
            eprintln!("Error rendering JSON output: {e}");
            process::exit(1);
        });
        println!("{rendered}");
        return;
    }

    for (key, value) in stats_pairs(&save) {
        println!("{key}={value}");
    }
}

fn run_convert(cli: &Cli) {
    let out_path = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from("output.bin"));
    let out_file = File::create(&out_path).unwrap_or_else(|e| {
        eprintln!("Error creating {}: {e}", out_path.display());
        process::exit(2);
    });

    let mut writer = BufWriter::new(out_file);
    let summary = convert(open_input(&cli.path), &mut writer).unwrap_or_else(|e| {
        eprintln!("Error converting {}: {e}", cli.path.display());
        process::exit(2);
    });
    writer.into_inner().unwrap_or_else(|e| {
        eprintln!("Error writing {}: {e}", out_path.display());
        process::exit(1);
    });

    if cli.json {
        let rendered = serde_json::to_string_pretty(&summary).unwrap_or_else(|e| {
            eprintln!("Error rendering JSON output: {e}");
            process::exit(1);
        });
        println!("{rendered}");
        return;
    }

    for fault in &summary.sections_skipped {
        eprintln!("Skipped section: {fault}");
    }
    if let Some(fault) = &summary.aborted {
        eprintln!("Stopped early: {fault}");
    }
    println!(
        "Wrote {} section(s) to {}",
        summary.sections_emitted,
        out_path.display()
    );
}

fn main() {
    let cli = Cli::parse();

    if cli.pkt {
        print_package(&cli);
        return;
    }
    if cli.stats {
        print_stats(&cli);
        return;
    }
    run_convert(&cli);
}
