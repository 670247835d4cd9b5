use anyhow::{bail, Context, Result};
use axmlstrings::{Container, StringPool};
use std::fs::File;
use std::io::BufReader;
use std::env;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        bail!("usage: {} <binary xml file>", args[0]);
    }

    let fname = &args[1];
    let f = File::open(fname).with_context(|| format!("cannot open {}", fname))?;
    let mut reader = BufReader::new(f);
    let container =
        Container::open(&mut reader).with_context(|| format!("{} failed to parse", fname))?;

    let pool = container.string_pool();
    println!("file size: {}", container.declared_file_size());
    println!(
        "string pool: {} strings, {} styled, {}{}",
        pool.len(),
        pool.styled_len(),
        if pool.is_utf8() { "UTF-8" } else { "UTF-16" },
        if pool.is_sorted() { ", sorted" } else { "" }
    );

    let mut s = String::new();
    format_pool(pool, &mut s)?;
    print!("{}", s);

    Ok(())
}

fn format_pool(pool: &StringPool, output: &mut String) -> Result<()> {
    let width = pool.len().to_string().len();

    for (i, value) in pool.iter().enumerate() {
        output.push_str(&format!("[{:>width$}] {}\n", i, escape(value), width = width));

        for span in pool.styles(i).unwrap_or(&[]) {
            let tag = pool.resolve(span.name)?.unwrap_or("?");
            output.push_str(&format!(
                "{:indent$}<{}> {}..={}\n",
                "",
                tag,
                span.first_char,
                span.last_char,
                indent = width + 3
            ));
        }
    }

    Ok(())
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n").replace('\r', "\\r")
}
