//! Merge and cleaning benchmarks over synthetic transcripts.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use chunkscribe::cleaning::CleaningPipeline;
use chunkscribe::config::Language;
use chunkscribe::dispatch::TranscriptionResult;
use chunkscribe::merge::TranscriptMerger;
use chunkscribe::{ModelConfig, ModelId};

fn chunk_results(chunks: usize, sentences_per_chunk: usize) -> Vec<TranscriptionResult> {
    let mut results = Vec::with_capacity(chunks);
    let mut carry = String::new();

    for id in 0..chunks {
        let mut text = carry.clone();
        for s in 0..sentences_per_chunk {
            text.push_str(&format!("チャンク{id}の{s}番目の発話内容がここに入ります。"));
        }
        // Overlap: last sentence repeats at the head of the next chunk
        carry = format!("チャンク{id}の{}番目の発話内容がここに入ります。", sentences_per_chunk - 1);

        results.push(TranscriptionResult {
            id,
            text,
            start_time: id as f64 * 60.0,
            end_time: (id + 1) as f64 * 60.0 + 3.0,
            success: true,
            error: None,
            segments: None,
            confidence: None,
            language: None,
        });
    }
    results
}

fn bench_merge(c: &mut Criterion) {
    let merger = TranscriptMerger::new(
        ModelConfig::for_model(ModelId::Whisper),
        Language::Japanese,
        false,
    );
    let results = chunk_results(20, 30);

    c.bench_function("merge_20_chunks", |b| {
        b.iter(|| merger.merge(black_box(&results)).unwrap())
    });
}

fn bench_cleaning(c: &mut Criterion) {
    let pipeline = CleaningPipeline::for_model(ModelId::Whisper).unwrap();
    let mut text = String::new();
    for i in 0..200 {
        text.push_str(&format!("{i}番目の段落の本文がここに書かれています。"));
    }
    text.push_str(&"ご視聴ありがとうございました。".repeat(12));

    c.bench_function("clean_noisy_transcript", |b| {
        b.iter(|| pipeline.run(black_box(&text), Language::Japanese, Some(1200.0)))
    });
}

criterion_group!(benches, bench_merge, bench_cleaning);
criterion_main!(benches);
