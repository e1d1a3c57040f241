use cb_compiler::{convert_array, ConvertOptions, Diagnostics};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn synthetic_rules(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| match i % 8 {
            0 => format!("||ads{}.example.com^$third-party", i),
            1 => format!("##.banner-{}", i),
            2 => format!("site{}.org##.sidebar > .ad", i),
            3 => format!("@@||cdn{}.example.net^$image", i),
            4 => format!("site{}.org#%#//scriptlet('set-constant', 'ads', 'false')", i),
            5 => format!("||tracker{}.io/pixel.gif$image,domain=news.com|~shop.news.com", i),
            6 => format!("site{}.com#?#div:has(> a[href*=\"promo\"])", i),
            _ => format!("/banner{}[a-z]+/$script", i),
        })
        .collect()
}

fn bench_convert(c: &mut Criterion) {
    let rules = synthetic_rules(10_000);

    c.bench_function("convert_basic_10k", |b| {
        let options = ConvertOptions::default();
        b.iter(|| {
            let mut diagnostics = Diagnostics::new();
            black_box(convert_array(black_box(&rules), &options, &mut diagnostics))
        })
    });

    c.bench_function("convert_advanced_10k", |b| {
        let options = ConvertOptions {
            advanced_blocking: true,
            ..ConvertOptions::default()
        };
        b.iter(|| {
            let mut diagnostics = Diagnostics::new();
            black_box(convert_array(black_box(&rules), &options, &mut diagnostics))
        })
    });
}

criterion_group!(benches, bench_convert);
criterion_main!(benches);
