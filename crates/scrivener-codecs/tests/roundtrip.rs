use scrivener_codecs::{CodecError, Format, export_items, format_ids, import_payload};
use scrivener_core::Item;

const RECORD: &str = r#"@article{nottebohm1971,
  title = {Neural Lateralization of Vocal Control in a Passerine Bird},
  author = {Nottebohm, Fernando and Marler, Peter and Arnold, Arthur P.},
  journal = {Journal of Experimental Zoology},
  year = {1971},
  volume = {177},
  number = {2},
  pages = {229--261},
  doi = {10.1002/jez.1401770210}
}
"#;

fn creators(item: &Item) -> Vec<(String, String)> {
    item.creators
        .iter()
        .map(|c| (c.first_name().to_string(), c.last_name().to_string()))
        .collect()
}

#[test]
fn bibtex_round_trip_keeps_title_creators_and_year() {
    let imported = import_payload(RECORD.as_bytes(), Some("bibtex")).unwrap();
    assert_eq!(imported.len(), 1);

    let exported = export_items(&imported, "bibtex").unwrap();
    assert_eq!(exported.content_type(), "application/x-bibtex; charset=utf-8");
    let again = import_payload(&exported.bytes, None).unwrap();

    let (before, after) = (&imported[0], &again[0]);
    assert_eq!(after.title(), before.title());
    assert_eq!(
        after.title(),
        Some("Neural Lateralization of Vocal Control in a Passerine Bird")
    );
    assert_eq!(creators(after), creators(before));
    assert_eq!(creators(after)[2], ("Arthur P.".to_string(), "Arnold".to_string()));
    assert_eq!(after.year(), Some("1971"));
    assert_eq!(after.get("pages"), Some("229-261"));
    assert_eq!(after.get("DOI"), Some("10.1002/jez.1401770210"));
}

#[test]
fn unknown_format_produces_no_bytes() {
    let items = import_payload(RECORD.as_bytes(), None).unwrap();
    let err = export_items(&items, "not-a-real-format").unwrap_err();
    assert_eq!(err.valid, format_ids());
}

#[test]
fn every_format_exports_and_importable_ones_come_back() {
    let items = import_payload(RECORD.as_bytes(), None).unwrap();
    for format in Format::ALL {
        let exported = export_items(&items, format.id()).unwrap();
        assert!(!exported.bytes.is_empty(), "{format} produced nothing");
        if !format.can_import() {
            continue;
        }
        let back = import_payload(&exported.bytes, Some(format.id())).unwrap();
        assert_eq!(back[0].title(), items[0].title(), "{format}");
        assert_eq!(creators(&back[0]), creators(&items[0]), "{format}");
    }
}

#[test]
fn dedupe_is_left_to_the_caller() {
    let doubled = format!("{}\n{}", RECORD, RECORD.replace("nottebohm1971", "copy"));
    let items = import_payload(doubled.as_bytes(), None).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(scrivener_core::matching::dedupe(items).len(), 1);
}

#[test]
fn schema_violations_are_import_errors() {
    let err = import_payload(br#"[{"itemType": "scroll", "title": "x"}]"#, None).unwrap_err();
    assert!(matches!(err, CodecError::Import(_)));
    assert!(err.to_string().contains("scroll"));
}

#[test]
fn bibtex_round_trip_keeps_biblatex_entry_types() {
    for (entry, item_type) in [
        ("online", "webpage"),
        ("patent", "patent"),
        ("software", "computerProgram"),
        ("dataset", "dataset"),
    ] {
        let bib = format!(
            "@{entry}{{rec, title={{A Record of Some Kind}}, author={{Doe, Jane}}, year={{2020}}, url={{https://records.test/1}}}}\n"
        );
        let imported = import_payload(bib.as_bytes(), Some("bibtex")).unwrap();
        assert_eq!(imported[0].item_type, item_type);

        let exported = export_items(&imported, "bibtex").unwrap();
        let text = String::from_utf8(exported.bytes.clone()).unwrap();
        assert!(text.starts_with(&format!("@{entry}{{")), "{text}");

        let again = import_payload(&exported.bytes, None).unwrap();
        assert_eq!(again[0].item_type, item_type);
        assert_eq!(again[0].get("url"), Some("https://records.test/1"));
    }
}

#[test]
fn ris_round_trip_keeps_series_and_both_serial_numbers() {
    let ris = "TY  - BOOK\nTI  - Walden\nAU  - Thoreau, Henry\nT2  - American Classics\n\
               SN  - 978-0-19-929115-1\nSN  - 0028-0836\nER  - \n";
    let imported = import_payload(ris.as_bytes(), Some("ris")).unwrap();
    assert_eq!(imported[0].get("series"), Some("American Classics"));
    assert_eq!(imported[0].get("ISSN"), Some("0028-0836"));

    let exported = export_items(&imported, "ris").unwrap();
    let text = String::from_utf8(exported.bytes.clone()).unwrap();
    assert!(text.contains("T2  - American Classics\r\n"));
    assert!(text.contains("SN  - 978-0-19-929115-1\r\n"));
    assert!(text.contains("SN  - 0028-0836\r\n"));

    let again = import_payload(&exported.bytes, None).unwrap();
    assert_eq!(again[0].get("series"), Some("American Classics"));
    assert_eq!(again[0].get("ISBN"), imported[0].get("ISBN"));
    assert_eq!(again[0].get("ISSN"), Some("0028-0836"));
}

#[test]
fn comparison_signs_in_titles_survive_import() {
    let ris = "TY  - JOUR\nTI  - Why a<b and c>d matter\nER  - \n";
    let items = import_payload(ris.as_bytes(), None).unwrap();
    assert_eq!(items[0].title(), Some("Why a<b and c>d matter"));
}
