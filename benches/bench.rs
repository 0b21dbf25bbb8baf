use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ckks_rns::{
    create_ckks_decryptor_suite, export_ciphertext_coefficients, import_ciphertext,
    Evaluator, SecurityLevel,
};

fn ckks_benchmark(c: &mut Criterion, name: &str, poly_modulus_degree: usize, coeff_modulus_bits: &[usize], log_scale: i32) {
    let get_name = |op: &str| format!("{}/{}", name, op);
    let (_, context, encoder, keygen, encryptor, decryptor) =
        create_ckks_decryptor_suite(poly_modulus_degree, coeff_modulus_bits, SecurityLevel::Tc128).unwrap();
    let evaluator = Evaluator::new(context.clone());
    let relin_keys = keygen.relinearization_key().unwrap();
    let galois_keys = keygen.galois_keys(&[1, 7]).unwrap();

    let scale = 2f64.powi(log_scale);
    let message: Vec<f64> = (0..encoder.slot_count()).map(|i| (i % 17) as f64 / 17.0).collect();

    c.bench_function(&get_name("Encode"), |b| b.iter(|| encoder.encode(black_box(&message), Some(scale), None).unwrap()));
    let plain = encoder.encode(&message, Some(scale), None).unwrap();
    c.bench_function(&get_name("Decode"), |b| b.iter(|| encoder.decode(black_box(&plain)).unwrap()));

    c.bench_function(&get_name("Encrypt"), |b| b.iter(|| encryptor.encrypt(black_box(&plain)).unwrap()));
    c.bench_function(&get_name("EncryptSym"), |b| b.iter(|| encryptor.encrypt_symmetric(black_box(&plain)).unwrap()));

    let cipher1 = encryptor.encrypt(&plain).unwrap();
    let cipher2 = encryptor.encrypt(&plain).unwrap();
    c.bench_function(&get_name("Decrypt"), |b| b.iter(|| decryptor.decrypt(black_box(&cipher1)).unwrap()));

    c.bench_function(&get_name("Add"), |b| b.iter(|| evaluator.add(&cipher1, &cipher2).unwrap()));
    c.bench_function(&get_name("MulPlain"), |b| b.iter(|| evaluator.multiply_plain(&cipher1, &plain).unwrap()));
    c.bench_function(&get_name("Mul"), |b| b.iter(|| evaluator.multiply(&cipher1, &cipher2).unwrap()));
    c.bench_function(&get_name("Square"), |b| b.iter(|| evaluator.square(&cipher1).unwrap()));
    c.bench_function(&get_name("MulScalar"), |b| b.iter(|| evaluator.multiply_plain_scalar(&cipher1, black_box(0.5)).unwrap()));
    c.bench_function(&get_name("Power(2)"), |b| b.iter(|| evaluator.power(&cipher1, 2, &relin_keys).unwrap()));
    if context.top_level() >= 2 {
        c.bench_function(&get_name("Polyval(2)"), |b| b.iter(|| evaluator.polyval(&cipher1, &[0.5, -1.0, 0.25], &relin_keys).unwrap()));
    }

    let cipher3 = evaluator.multiply(&cipher1, &cipher2).unwrap();
    c.bench_function(&get_name("Relinear"), |b| b.iter(|| evaluator.relinearize(&cipher3, &relin_keys).unwrap()));
    c.bench_function(&get_name("MulRelin"), |b| b.iter(|| {
        let mut product = evaluator.multiply(&cipher1, &cipher2).unwrap();
        evaluator.relinearize_inplace(&mut product, &relin_keys).unwrap();
        product
    }));

    let relinearized = evaluator.relinearize(&cipher3, &relin_keys).unwrap();
    c.bench_function(&get_name("Rescale"), |b| b.iter(|| evaluator.rescale(&relinearized).unwrap()));
    c.bench_function(&get_name("Modswitch"), |b| b.iter(|| evaluator.mod_switch_to_next(&cipher1).unwrap()));

    c.bench_function(&get_name("RotVec(1)"), |b| b.iter(|| evaluator.rotate(&cipher1, 1, &galois_keys).unwrap()));
    c.bench_function(&get_name("RotVec(7)"), |b| b.iter(|| evaluator.rotate(&cipher1, 7, &galois_keys).unwrap()));

    c.bench_function(&get_name("RawExport"), |b| b.iter(|| export_ciphertext_coefficients(black_box(&cipher1))));
    let flat: Vec<u64> = export_ciphertext_coefficients(&cipher1).into_iter().flatten().flatten().collect();
    c.bench_function(&get_name("RawImport"), |b| b.iter(|| {
        import_ciphertext(&context, black_box(&flat), cipher1.parms_id(), cipher1.scale(), 2).unwrap()
    }));
}

fn criterion_benchmark(c: &mut Criterion) {
    ckks_benchmark(c, "ckks-4096", 4096, &[40, 30, 30], 30);
    ckks_benchmark(c, "ckks-8192", 8192, &[60, 40, 40, 60], 40);
    ckks_benchmark(c, "ckks-16384", 16384, &[60, 40, 40, 40, 40, 60], 40);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
