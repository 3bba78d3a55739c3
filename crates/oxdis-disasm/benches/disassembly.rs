//! Benchmarks for decode throughput.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use oxdis_disasm::{Disassembler, IntelFormatter, X86Decoder};

/// 64-bit array-summing loop. Exercises the decode paths a real text
/// section leans on: REX-prefixed ALU forms, memory operands, short
/// branches both ways, a two-byte opcode, and a group-5 decrement.
const ARRAY_SUM: &[u8] = &[
    0x53, // push rbx
    0x48, 0x31, 0xdb, // xor rbx, rbx
    0x48, 0x85, 0xf6, // test rsi, rsi
    0x74, 0x10, // je .done
    // .next:
    0x48, 0x03, 0x1f, // add rbx, [rdi]
    0x48, 0x83, 0xc7, 0x08, // add rdi, 8
    0x48, 0xff, 0xce, // dec rsi
    0x75, 0xf4, // jne .next
    0x0f, 0xb6, 0xc3, // movzx eax, bl
    0xe8, 0x00, 0x00, 0x00, 0x00, // call checksum
    // .done:
    0x48, 0x89, 0xd8, // mov rax, rbx
    0x5b, // pop rbx
    0xc3, // ret
];

/// Tiles the fixture out to `size` bytes for throughput runs. The last
/// repetition may be cut mid-instruction, which the block sweep absorbs.
fn tile_code(size: usize) -> Vec<u8> {
    ARRAY_SUM.iter().copied().cycle().take(size).collect()
}

fn bench_decode(c: &mut Criterion) {
    let decoder = X86Decoder::long_mode();

    let mut group = c.benchmark_group("x86_decode");

    group.bench_function("single_instruction", |b| {
        b.iter(|| {
            // add rbx, [rdi]
            let _ = decoder.decode_instruction(black_box(&ARRAY_SUM[9..12]), 0x1000);
        })
    });

    group.bench_function("small_function", |b| {
        b.iter(|| {
            let _ = decoder.disassemble_block(black_box(ARRAY_SUM), 0x1000);
        })
    });

    for size in [1024, 4096, 16384, 65536] {
        let code = tile_code(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("throughput", size), &code, |b, code| {
            b.iter(|| {
                let _ = decoder.disassemble_block(black_box(code), 0x1000);
            })
        });
    }

    group.finish();
}

fn bench_format(c: &mut Criterion) {
    let decoder = X86Decoder::long_mode();
    let formatter = IntelFormatter::new();

    let instructions: Vec<_> = decoder
        .disassemble_block(ARRAY_SUM, 0x1000)
        .into_iter()
        .filter_map(Result::ok)
        .collect();

    c.bench_function("format_small_function", |b| {
        b.iter(|| {
            for info in &instructions {
                let _ = formatter.format(black_box(info));
            }
        })
    });
}

criterion_group!(benches, bench_decode, bench_format);
criterion_main!(benches);
