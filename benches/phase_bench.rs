//! Benchmarks for the phase rewriter.
//!
//! Run with: cargo bench --bench phase_bench
//!
//! The rewriter sits on the hot path of every streamed token, so these
//! benchmarks cover the common event shapes: plain answer passthrough,
//! thinking markup rewriting in each mode, and tool-call wrapper
//! stripping with reconstruction.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use zai_proxy::core::config::ThinkMode;
use zai_proxy::transformer::{Phase, PhaseRewriter, StreamRewriter, UpstreamEvent};

fn bench_answer_passthrough(c: &mut Criterion) {
    let event = UpstreamEvent::new(Phase::Answer, "The quick brown fox jumps over the lazy dog.");

    c.bench_function("answer_passthrough", |b| {
        b.iter(|| {
            let mut rewriter = PhaseRewriter::new(ThinkMode::Reasoning);
            rewriter.rewrite(black_box(&event))
        })
    });
}

fn bench_thinking_rewrite_by_mode(c: &mut Criterion) {
    let event = UpstreamEvent::new(
        Phase::Thinking,
        "<details type=\"reasoning\" open>\n<summary>Thinking...</summary>\n> first step\n> second step\n",
    );

    let mut group = c.benchmark_group("thinking_rewrite");
    for mode in [
        ThinkMode::Reasoning,
        ThinkMode::Think,
        ThinkMode::Strip,
        ThinkMode::Details,
    ] {
        group.bench_with_input(
            BenchmarkId::from_parameter(mode.as_str()),
            &mode,
            |b, &mode| {
                b.iter(|| {
                    let mut rewriter = PhaseRewriter::new(mode);
                    rewriter.rewrite(black_box(&event))
                })
            },
        );
    }
    group.finish();
}

fn bench_thinking_to_answer_transition(c: &mut Criterion) {
    let thinking = UpstreamEvent::new(Phase::Thinking, "> weighing the options\n");
    let answer = UpstreamEvent::new(
        Phase::Answer,
        "<summary duration=\"3\">Thought for 3 seconds</summary>\n</details>\n\nHere is the plan.",
    );

    c.bench_function("thinking_to_answer_transition", |b| {
        b.iter(|| {
            let mut rewriter = PhaseRewriter::new(ThinkMode::Details);
            rewriter.rewrite(black_box(&thinking));
            rewriter.rewrite(black_box(&answer))
        })
    });
}

fn bench_tool_call_reconstruction(c: &mut Criterion) {
    let frag1 = UpstreamEvent::new(
        Phase::ToolCall,
        "\n<glm_block view=\"mcp\">{\"type\": \"mcp\", \"data\": {\"metadata\": {\"id\": \"call_1\", \"name\": \"get_weather\", ",
    );
    let frag2 = UpstreamEvent::new(
        Phase::ToolCall,
        "\"arguments\": \"{\\\"city\\\": \\\"Paris\\\", \\\"unit\\\": \\\"celsius\\\"}\"}",
    );

    c.bench_function("tool_call_reconstruction", |b| {
        b.iter(|| {
            let mut rewriter = StreamRewriter::new(ThinkMode::Reasoning);
            rewriter.push(black_box(&frag1));
            rewriter.push(black_box(&frag2))
        })
    });
}

fn bench_long_thinking_delta(c: &mut Criterion) {
    let text = "> reasoning line with some moderately long content here\n".repeat(50);
    let event = UpstreamEvent::new(Phase::Thinking, text.clone());

    let mut group = c.benchmark_group("long_thinking_delta");
    group.throughput(Throughput::Bytes(text.len() as u64));
    group.bench_function("reasoning_mode", |b| {
        b.iter(|| {
            let mut rewriter = PhaseRewriter::new(ThinkMode::Reasoning);
            rewriter.rewrite(black_box(&event))
        })
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_answer_passthrough,
    bench_thinking_rewrite_by_mode,
    bench_thinking_to_answer_transition,
    bench_tool_call_reconstruction,
    bench_long_thinking_delta
);
criterion_main!(benches);
