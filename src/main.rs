use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ckks_rns::{
    create_ckks_decryptor_suite, export_ciphertext_coefficients, import_ciphertext, Ciphertext, CkksError,
    Evaluator, SecurityLevel,
};

#[derive(Parser)]
#[command(about = "Encrypts a vector, squares it, rotates it and decrypts the results")]
struct Arguments {

    #[arg(long, default_value_t = 8192)]
    degree: usize,

    /// Prime bit sizes, data primes first and the special prime last.
    #[arg(long, value_delimiter = ',', default_value = "60,40,40,60")]
    bits: Vec<usize>,

    #[arg(long = "log-scale", default_value_t = 40)]
    log_scale: i32,

    #[arg(long, value_delimiter = ',', allow_hyphen_values = true, default_value = "1.1,2.2,3.3,4.4")]
    values: Vec<f64>,

}

fn print_vector(name: &str, values: &[f64], count: usize) {
    let shown: Vec<String> = values.iter().take(count).map(|x| format!("{:.6}", x)).collect();
    println!("  {:<10} = [{}]", name, shown.join(", "));
}

fn main() -> Result<(), CkksError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Arguments::parse();
    let scale = 2f64.powi(args.log_scale);
    println!("[Arguments]");
    println!("  poly degree = {}", args.degree);
    println!("  log q       = {:?}", args.bits);
    println!("  scale       = 2^{}", args.log_scale);

    let (_, context, encoder, keygen, encryptor, decryptor) =
        create_ckks_decryptor_suite(args.degree, &args.bits, SecurityLevel::Tc128)?;
    let evaluator = Evaluator::new(context.clone());
    let relin_keys = keygen.relinearization_key()?;
    let galois_keys = keygen.galois_keys(&[1])?;
    info!(slots = encoder.slot_count(), top_level = context.top_level(), "keys ready");

    let count = args.values.len();
    let plain = encoder.encode(&args.values, Some(scale), None)?;
    let encrypted = encryptor.encrypt(&plain)?;
    let decrypt = |c: &Ciphertext| -> Result<Vec<f64>, CkksError> { encoder.decode(&decryptor.decrypt(c)?) };

    println!("[Results]");
    print_vector("input", &args.values, count);

    let doubled = evaluator.add(&encrypted, &encrypted)?;
    print_vector("doubled", &decrypt(&doubled)?, count);

    let mut squared = evaluator.square(&encrypted)?;
    evaluator.relinearize_inplace(&mut squared, &relin_keys)?;
    evaluator.rescale_inplace(&mut squared)?;
    print_vector("squared", &decrypt(&squared)?, count);
    println!("  level {} -> {}, scale 2^{:.3}", encrypted.level(), squared.level(), squared.scale().log2());

    let rotated = evaluator.rotate(&encrypted, 1, &galois_keys)?;
    print_vector("rotated", &decrypt(&rotated)?, count);

    let exported = export_ciphertext_coefficients(&doubled);
    let flat: Vec<u64> = exported.iter().flatten().flatten().copied().collect();
    let imported = import_ciphertext(&context, &flat, doubled.parms_id(), doubled.scale(), exported.len())?;
    print_vector("reimported", &decrypt(&imported)?, count);
    info!(words = flat.len(), identical = (imported == doubled), "raw round trip");

    Ok(())
}
