use lumos_codes::{encode, HmacSha256Encoder, KeyRing, ReverseIndex, Verifier};

#[divan::bench]
fn bench_encode(bencher: divan::Bencher) {
    let ring = KeyRing::builtin();
    let key = ring.get(1).unwrap();
    bencher.bench(|| encode(divan::black_box(12345), key));
}

#[divan::bench(args = [1_000, 10_000])]
fn bench_verify_miss_sequential(bencher: divan::Bencher, bound: u64) {
    let ring = KeyRing::builtin();
    let verifier = Verifier::new(&ring, bound);
    bencher
        .counter(divan::counter::ItemsCount::new(bound as usize * ring.len()))
        .bench(|| verifier.verify(divan::black_box("LUMOS-ZZZZZZZZ")));
}

#[divan::bench(args = [1_000, 10_000])]
fn bench_verify_miss_parallel(bencher: divan::Bencher, bound: u64) {
    let ring = KeyRing::builtin();
    let verifier = Verifier::new(&ring, bound).parallel(true);
    bencher
        .counter(divan::counter::ItemsCount::new(bound as usize * ring.len()))
        .bench(|| verifier.verify(divan::black_box("LUMOS-ZZZZZZZZ")));
}

#[divan::bench]
fn bench_reverse_index_lookup(bencher: divan::Bencher) {
    let ring = KeyRing::builtin();
    let index = ReverseIndex::build(&HmacSha256Encoder, &ring, 10_000);
    let code = encode(9_999, ring.get(4).unwrap());
    bencher.bench(|| index.lookup(divan::black_box(code.as_str())));
}

fn main() {
    divan::main();
}
