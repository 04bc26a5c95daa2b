//! Benchmarks for prompt parsing and URL-set construction.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use researchflow::core::UrlSet;
use researchflow::orchestrator::parse_prompt;
use researchflow::stages::normalize_url;

const PROMPTS: [&str; 4] = [
    "Research the history of the internet",
    "Please look into Rust async runtimes and publish the results to Confluence.",
    "Tell me about the post-war economy in Google Docs",
    "research battery chemistry, then upload the report to SharePoint for the team",
];

fn prompt_benchmark(c: &mut Criterion) {
    c.bench_function("parse_prompt", |b| {
        b.iter(|| {
            for prompt in PROMPTS {
                let _ = black_box(parse_prompt(black_box(prompt)));
            }
        });
    });
}

fn url_set_benchmark(c: &mut Criterion) {
    let raw: Vec<String> = (0..200)
        .map(|i| format!("https://Site{}.example/page/{}#frag", i % 50, i))
        .collect();

    c.bench_function("url_set_from_raw", |b| {
        b.iter(|| {
            let set: UrlSet = raw
                .iter()
                .filter_map(|url| normalize_url(black_box(url)))
                .collect();
            black_box(set.len())
        });
    });
}

criterion_group!(benches, prompt_benchmark, url_set_benchmark);
criterion_main!(benches);
