/// Mount archives and directories into one tree, list it and extract a file
///
/// Run with:
///   cargo run --example mount -- mounts.toml
///   cargo run --example mount -- base.scs def.zip mods/ -- /def/world.sii out/world.sii
///
/// Set RUST_LOG=layered_vfs=debug to see mount and lookup tracing.
use anyhow::{bail, Context};
use layered_vfs::{copy_file, FileSystem, MountConfig, OpenMode, Vfs};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (roots, extract) = match args.iter().position(|arg| arg == "--") {
        Some(split) => (&args[..split], &args[split + 1..]),
        None => (&args[..], &[][..]),
    };
    if roots.is_empty() {
        bail!("usage: mount <mounts.toml | root...> [-- <vfs path> <output path>]");
    }

    let mut vfs = Vfs::new();
    if roots.len() == 1 && roots[0].ends_with(".toml") {
        let config = MountConfig::load(&roots[0])
            .with_context(|| format!("loading {}", roots[0]))?;
        for failure in vfs.mount_config(&config) {
            println!("skipped {}: {}", failure.root, failure.error);
        }
    } else {
        // Later roots shadow earlier ones
        for (priority, root) in roots.iter().enumerate() {
            vfs.mount(root, priority as i32)
                .with_context(|| format!("mounting {root}"))?;
        }
    }

    println!("=== Mounted ({} layers) ===", vfs.overlay().len());
    for (priority, fs) in vfs.overlay().mounted() {
        println!("  {:>4}  {:<9} {}", priority, fs.name(), fs.root());
    }

    println!("\n=== / ===");
    let mut listing = vfs.overlay().read_dir("/", true, true)?;
    listing.sort_by(|a, b| a.path.cmp(&b.path));
    for entry in &listing {
        let marker = if entry.is_directory { "/" } else { "" };
        let lock = if entry.is_encrypted { " (encrypted)" } else { "" };
        println!("  {}{}{}", entry.path, marker, lock);
    }

    if let [source, target] = extract {
        let mut input = vfs
            .overlay()
            .open(source, OpenMode::read_binary())
            .with_context(|| format!("opening {source}"))?;
        let mut output = vfs
            .system()
            .open(target, OpenMode::WRITE | OpenMode::BINARY)
            .with_context(|| format!("creating {target}"))?;
        let copied = copy_file(input.as_mut(), output.as_mut())?;
        output.flush()?;
        println!("\nextracted {source} -> {target} ({copied} bytes)");
    }

    Ok(())
}
