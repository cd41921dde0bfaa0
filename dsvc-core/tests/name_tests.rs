use dsvc_core::base::{generate_available_name, infer_name};

#[test]
fn infers_names_from_body_filenames() {
    let cases = [
        ("body_four.json", "body_four"),
        ("TenMoviesAndLengths.csv", "ten_movies_and_lengths"),
        ("2018_winners.json", "dataset_2018_winners"),
        ("piraña.csv", "pirana"),
        ("Ten Movies (2018).csv", "ten_movies_2018"),
        ("/tmp/uploads/my-data.csv", "my-data"),
        ("!!!.json", "dataset"),
    ];
    for (filename, want) in cases {
        assert_eq!(infer_name(filename), want, "name for {filename}");
    }
}

#[test]
fn available_name_skips_taken_suffixes() {
    let taken = ["body_1", "body_2"];
    let name = generate_available_name("body", |n| Ok(taken.contains(&n))).expect("generate");
    assert_eq!(name, "body_3");

    let name = generate_available_name("fresh", |_| Ok(false)).expect("generate");
    assert_eq!(name, "fresh_1");
}
