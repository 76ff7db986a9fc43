//! Tree command.

use std::path::PathBuf;

use crate::config::Settings;
use crate::sync::LiveTree;
use crate::tree::{FileTree, IgnoreMatcher};

/// Render visible rows, one per line, indented by depth.
pub fn render(tree: &FileTree) -> String {
    let mut out = String::new();
    for node in tree.visible() {
        let indent = "  ".repeat(node.depth.saturating_sub(1));
        let marker = match (node.is_dir, node.is_expanded) {
            (true, true) => "v ",
            (true, false) => "> ",
            (false, _) => "  ",
        };
        out.push_str(&indent);
        out.push_str(marker);
        out.push_str(&node.name);
        if node.is_dir {
            out.push('/');
        }
        if node.is_ignored {
            out.push_str(" (ignored)");
        }
        out.push('\n');
    }
    out
}

/// Run tree command - print once, or keep reprinting on change.
pub async fn run_tree(
    dir: Option<PathBuf>,
    depth: usize,
    watch: bool,
    settings: &Settings,
) -> anyhow::Result<()> {
    let root = match dir {
        Some(dir) => dir,
        None => std::env::current_dir()?,
    };

    if !watch {
        let ignore = IgnoreMatcher::new(
            root.clone(),
            &settings.tree.ignore_patterns,
            settings.tree.respect_gitignore,
        )?;
        let mut tree = FileTree::new(root, ignore);
        tree.build()?;
        tree.expand_to_depth(depth);
        print!("{}", render(&tree));
        return Ok(());
    }

    let (live, mut updates) = LiveTree::start(root, settings)?;
    live.tree().write().expand_to_depth(depth);
    print!("{}", render(&live.tree().read()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            update = updates.recv() => match update {
                Some(outcome) => {
                    crate::debug_event!("cli", "redraw", "{outcome:?}");
                    println!();
                    print!("{}", render(&live.tree().read()));
                }
                None => break,
            },
        }
    }

    live.shutdown().await;
    Ok(())
}
