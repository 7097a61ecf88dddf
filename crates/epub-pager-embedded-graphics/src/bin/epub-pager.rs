use clap::{Args, Parser, Subcommand};
use epub_pager::Book;
use epub_pager_embedded_graphics::MonoFontMetrics;
use epub_pager_render::{BookCache, LayoutParams, Section, Viewport};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "epub-pager", about = "Inspect and paginate EPUB files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print title, cover, spine and table of contents
    Info {
        /// Input EPUB file
        book: PathBuf,
    },
    /// Paginate one spine item into the cache and print its page count
    Paginate {
        #[command(flatten)]
        target: SectionArgs,
    },
    /// Print the words of one cached page, line by line
    Page {
        #[command(flatten)]
        target: SectionArgs,
        /// Page index within the section
        #[arg(long, default_value_t = 0)]
        page: usize,
    },
}

#[derive(Args)]
struct SectionArgs {
    /// Input EPUB file
    book: PathBuf,
    /// Spine index of the section
    #[arg(long, default_value_t = 0)]
    spine: usize,
    /// Cache root directory
    #[arg(long, default_value = ".epub-pager-cache")]
    cache: PathBuf,
    /// Screen width in pixels
    #[arg(long, default_value_t = 480)]
    width: i32,
    /// Screen height in pixels
    #[arg(long, default_value_t = 800)]
    height: i32,
    /// Mono font size bucket (0-3)
    #[arg(long, default_value_t = 1)]
    font: i32,
    /// Line height multiplier
    #[arg(long, default_value_t = 0.95)]
    line_compression: f32,
}

impl SectionArgs {
    fn params(&self) -> LayoutParams {
        LayoutParams {
            font_id: self.font,
            line_compression: self.line_compression,
            ..LayoutParams::default()
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli.command) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Info { book } => {
            let book = Book::open(&book)?;
            println!("title: {}", book.title());
            if let Some(cover) = book.cover_item_path() {
                println!("cover: {}", cover);
            }
            println!("spine:");
            for (i, item) in book.spine().iter().enumerate() {
                println!("  {:>3} {} ({})", i, item.href, item.idref);
            }
            println!("toc:");
            for entry in book.toc() {
                let indent = "  ".repeat(entry.nesting_level + 1);
                match &entry.anchor {
                    Some(anchor) => println!("{}{} -> {}#{}", indent, entry.title, entry.href, anchor),
                    None => println!("{}{} -> {}", indent, entry.title, entry.href),
                }
            }
        }
        Command::Paginate { target } => {
            let (_book, section) = load_section(&target)?;
            println!(
                "spine {}: {} pages in {}",
                section.spine_index(),
                section.page_count(),
                section.dir().display()
            );
        }
        Command::Page { target, page } => {
            let (_book, section) = load_section(&target)?;
            let page = section.load_page(page)?;
            for line in &page.elements {
                println!("{:>4} {}", line.y, line.block.text());
            }
        }
    }
    Ok(())
}

fn load_section(target: &SectionArgs) -> Result<(Book, Section), Box<dyn std::error::Error>> {
    let book = Book::open(&target.book)?;
    let cache = BookCache::new(&target.cache);
    let params = target.params();
    let mut section = Section::new(&cache, &book, target.spine);
    if !section.load_cache_metadata(&params)? {
        section.build(
            &book,
            &MonoFontMetrics,
            Viewport::new(target.width, target.height),
            &params,
        )?;
    }
    Ok((book, section))
}
