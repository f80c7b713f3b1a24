//! Seeded randomized checks of the counting, partitioning and export layers

use lyricount::csv_record::{Parsed, RecordReader};
use lyricount::partition::{partition, range_for};
use lyricount::rank::{write_report, RankedSeq};
use lyricount::wire::{encode_table, merge_encoded};
use lyricount::CountTable;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

fn random_table(rng: &mut StdRng, keys: usize) -> CountTable {
    let mut table = CountTable::new();
    for _ in 0..keys {
        let key = format!("k{}", rng.gen_range(0..200));
        table.increment(&key, rng.gen_range(1..50));
    }
    table
}

#[test]
fn merge_is_order_independent() {
    let mut rng = StdRng::seed_from_u64(42);
    let partials: Vec<CountTable> = (0..6)
        .map(|_| {
            let n = rng.gen_range(0..300);
            random_table(&mut rng, n)
        })
        .collect();

    let mut expected = CountTable::new();
    for p in &partials {
        expected.merge(p);
    }

    for _ in 0..20 {
        let mut order: Vec<usize> = (0..partials.len()).collect();
        order.shuffle(&mut rng);

        let mut direct = CountTable::new();
        let mut over_wire = CountTable::new();
        for &i in &order {
            direct.merge(&partials[i]);
            merge_encoded(&mut over_wire, &encode_table(&partials[i])).unwrap();
        }
        assert_eq!(direct, expected, "order {order:?}");
        assert_eq!(over_wire, expected, "order {order:?}");
    }
}

#[test]
fn partitions_cover_the_data_region_exactly() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..2000 {
        let header_len: u64 = rng.gen_range(0..64);
        let file_size = header_len + rng.gen_range(0..5000);
        let workers = rng.gen_range(1..40);

        let ranges = partition(file_size, header_len, workers);
        assert_eq!(ranges.len(), workers);
        assert_eq!(ranges[0].start, header_len);
        assert_eq!(ranges[workers - 1].end, file_size);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }

        let lens: Vec<u64> = ranges.iter().map(|r| r.len()).collect();
        let min = *lens.iter().min().unwrap();
        let max = *lens.iter().max().unwrap();
        assert!(max - min <= 1, "F={file_size} H={header_len} N={workers} {lens:?}");
        assert_eq!(lens.iter().sum::<u64>(), file_size - header_len);

        let i = rng.gen_range(0..workers);
        assert_eq!(range_for(file_size, header_len, workers, i), ranges[i]);
    }
}

#[test]
fn hostile_keys_survive_export() {
    let keys = [
        "plain",
        "comma,inside",
        "quote\"inside",
        "\"fully quoted\"",
        "line\nbreak",
        "crlf\r\nbreak",
        "bare\rreturn",
        " leading",
        "trailing ",
        "coração",
        "",
        "a,\"b\"\n,c",
    ];
    let table: CountTable = keys
        .iter()
        .enumerate()
        .map(|(i, k)| (*k, (i as i64 % 3) + 1))
        .collect();

    let mut out = Vec::new();
    let rows = write_report(&mut out, "label, with comma", &table, 0).unwrap();
    assert_eq!(rows, keys.len());

    let mut reader = RecordReader::new(out.as_slice(), 2);
    let mut parsed = Vec::new();
    while let Some(record) = reader.next_record().unwrap() {
        match record {
            Parsed::Record(fields) => parsed.push(fields),
            Parsed::Malformed(m) => panic!("malformed export: {m:?}"),
        }
    }

    assert_eq!(parsed[0], vec!["label, with comma", "count"]);
    let expected: Vec<Vec<String>> = RankedSeq::from_table(&table)
        .iter()
        .map(|(k, c)| vec![k.to_string(), c.to_string()])
        .collect();
    assert_eq!(&parsed[1..], expected.as_slice());
}

#[test]
fn ranking_ignores_insertion_order() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut entries: Vec<(String, i64)> = (0..500)
        .map(|i| (format!("w{i}"), rng.gen_range(1..8)))
        .collect();

    let render = |entries: &[(String, i64)], limit: usize| {
        let table: CountTable = entries.iter().map(|(k, c)| (k.as_str(), *c)).collect();
        let mut out = Vec::new();
        write_report(&mut out, "word", &table, limit).unwrap();
        out
    };

    let baseline_all = render(&entries, 0);
    let baseline_top = render(&entries, 25);
    for _ in 0..10 {
        entries.shuffle(&mut rng);
        assert_eq!(render(&entries, 0), baseline_all);
        assert_eq!(render(&entries, 25), baseline_top);
    }
    let all = String::from_utf8(baseline_all).unwrap();
    let top = String::from_utf8(baseline_top).unwrap();
    assert!(all.starts_with(&top));
}
