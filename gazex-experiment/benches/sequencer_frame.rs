use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use gazex_core::{FrameInput, Trial, TrialList, Vec3};
use gazex_experiment::{Paradigm, Sequencer, ShuffleMode, TrialListBuilder, TrialSchema};
use gazex_record::SessionRecorder;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::io;
use std::time::Duration;

fn trials(n: usize) -> TrialList {
    let trials = (0..n)
        .map(|i| Trial::new(i + 1, vec![format!("a{i}"), format!("b{i}"), format!("c{i}"), format!("d{i}")]))
        .collect();
    TrialList::new(trials, 0)
}

fn harness() -> (Sequencer, SessionRecorder<io::Sink>) {
    let paradigm = Paradigm::Corner;
    let mut seq = Sequencer::new(paradigm.sequencer(), trials(40)).unwrap();
    let mut rec = SessionRecorder::with_sink(io::sink(), paradigm.layout(), paradigm.flush_threshold());
    // get past fixation so frames land in the display phase
    for ms in [0, 1000] {
        let input = FrameInput::at(Duration::from_millis(ms)).looking_at("FixationDot", Some(Vec3::new(0.0, 0.0, 10.0)));
        seq.update(&input, &mut rec).unwrap();
    }
    (seq, rec)
}

pub fn bench_sequencer(c: &mut Criterion) {
    let mut g = c.benchmark_group("sequencer");
    g.sample_size(60);

    g.bench_function("display_frame", |b| {
        b.iter_batched(
            harness,
            |(mut seq, mut rec)| {
                let input = FrameInput::at(Duration::from_millis(1500))
                    .looking_at("QI", Some(Vec3::new(12.0, 9.0, 10.0)));
                let _ = seq.update(black_box(&input), &mut rec);
            },
            BatchSize::SmallInput,
        )
    });

    g.bench_function("one_second_at_90fps", |b| {
        b.iter_batched(
            harness,
            |(mut seq, mut rec)| {
                for i in 0..90u64 {
                    let input = FrameInput::at(Duration::from_nanos(1_000_000_000 + i * 1_000_000_000 / 90));
                    let _ = seq.update(black_box(&input), &mut rec);
                }
            },
            BatchSize::SmallInput,
        )
    });

    g.finish();
}

pub fn bench_builder(c: &mut Criterion) {
    let source: String = (0..200).map(|i| format!("a{i},b{i},c{i},d{i},clip{i}\n")).collect();
    let builder = TrialListBuilder::new(TrialSchema::four_images_with_media())
        .training_prefix(2)
        .shuffle(ShuffleMode::Legacy);

    c.bench_function("build_200_trials", |b| {
        b.iter(|| {
            let mut rng = ChaCha8Rng::seed_from_u64(1);
            builder.build(black_box(&source), &mut rng).unwrap()
        })
    });
}

criterion_group!(benches, bench_sequencer, bench_builder);
criterion_main!(benches);
