// Row normalizer: raw spreadsheet rows -> typed `SalesRecord`s.
use crate::error::LoadError;
use crate::types::{RawRecord, RawValue, SalesRecord};
use crate::util::{parse_date, parse_number};
use csv::ReaderBuilder;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Sku,
    Name,
    Quantity,
    Date,
    Supplier,
    Brand,
    Category,
    PurchasePrice,
    Commission,
    Logistics,
    SalePrice,
    Profit,
    Markup,
    Store,
    YandexPayment,
    Tax,
}

/// Candidate column labels per field, probed in order: sheet header,
/// column letter, English header, alternate header.
pub static FIELD_ALIASES: Lazy<HashMap<Field, &'static [&'static str]>> = Lazy::new(|| {
    let table: [(Field, &'static [&'static str]); 16] = [
        (Field::Sku, &["SKU", "C", "sku", "SKU kodi"]),
        (Field::Name, &["SKU Nomi", "B", "Mahsulot nomi", "Name"]),
        (Field::Quantity, &["Miqdor", "E", "Quantity", "Soni"]),
        (Field::Date, &["Sana", "F", "Date", "Sotilgan sana"]),
        (Field::Supplier, &["Yetkazuvchi", "H", "Supplier"]),
        (Field::Brand, &["Brend", "J", "Brand"]),
        (Field::Category, &["Kategoriya", "K", "Category"]),
        (Field::PurchasePrice, &["Xarid narxi", "M", "Purchase Price", "Narxi"]),
        (Field::Commission, &["Komissiya", "N", "Commission"]),
        (Field::Logistics, &["Logistika", "P", "Logistics"]),
        (Field::SalePrice, &["Sotuv narxi", "R", "Sale Price", "Sotilgan narx"]),
        (Field::Profit, &["Foyda", "S", "Profit"]),
        (Field::Markup, &["Markup %", "T", "Markup"]),
        (Field::Store, &["Dokon", "U", "Store", "Dokon nomi"]),
        (Field::YandexPayment, &["Yandex tolov", "W", "Payment"]),
        (Field::Tax, &["Soliq", "X", "Tax"]),
    ];
    table.into_iter().collect()
});

/// First non-blank value among the field's aliases.
pub fn resolve<'a>(row: &'a RawRecord, field: Field) -> Option<&'a RawValue> {
    FIELD_ALIASES
        .get(&field)?
        .iter()
        .filter_map(|alias| row.get(alias))
        .find(|v| !v.is_blank())
}

fn text(row: &RawRecord, field: Field) -> String {
    resolve(row, field).map(RawValue::to_text).unwrap_or_default()
}

/// Numeric cell coerced to `f64`; missing, non-numeric or non-finite -> 0.
fn number(row: &RawRecord, field: Field) -> f64 {
    match resolve(row, field) {
        Some(RawValue::Number(n)) if n.is_finite() => *n,
        Some(RawValue::Text(s)) => parse_number(s).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Map one raw row onto the schema. `None` when SKU or name is missing.
pub fn normalize_row(row: &RawRecord) -> Option<SalesRecord> {
    let sku = text(row, Field::Sku);
    let name = text(row, Field::Name);
    if sku.is_empty() || name.is_empty() {
        return None;
    }

    let purchase_price = number(row, Field::PurchasePrice);
    let commission = number(row, Field::Commission);
    let logistics = number(row, Field::Logistics);
    let sale_price = number(row, Field::SalePrice);
    let profit = number(row, Field::Profit);
    let margin = if sale_price > 0.0 {
        profit / sale_price * 100.0
    } else {
        0.0
    };

    Some(SalesRecord {
        sku,
        name,
        supplier: text(row, Field::Supplier),
        brand: text(row, Field::Brand),
        category: text(row, Field::Category),
        store: text(row, Field::Store),
        date: parse_date(&text(row, Field::Date)),
        quantity: number(row, Field::Quantity),
        purchase_price,
        commission,
        logistics,
        sale_price,
        profit,
        markup: number(row, Field::Markup),
        yandex_payment: number(row, Field::YandexPayment),
        tax: number(row, Field::Tax),
        total_cost: purchase_price + commission + logistics,
        margin,
    })
}

/// Normalize a batch, keeping source order and silently dropping rows
/// without a SKU or a name.
pub fn normalize(rows: &[RawRecord]) -> Vec<SalesRecord> {
    let records: Vec<SalesRecord> = rows.iter().filter_map(normalize_row).collect();
    let dropped = rows.len() - records.len();
    if dropped > 0 {
        tracing::debug!(dropped, kept = records.len(), "dropped rows without sku/name");
    }
    records
}

/// Header-row delimited text -> raw rows. Headers are trimmed, short rows
/// are allowed and rows whose cells are all empty are skipped.
pub fn parse_delimited<R: Read>(input: R) -> Result<Vec<RawRecord>, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(input);
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        let row: RawRecord = headers
            .iter()
            .zip(record.iter())
            .map(|(h, cell)| (h.clone(), cell.to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Read a locally saved CSV export of the sheet.
pub fn load_csv_file(path: &Path) -> Result<Vec<RawRecord>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::File {
        path: path.display().to_string(),
        source,
    })?;
    let rows = parse_delimited(file)?;
    tracing::info!(rows = rows.len(), path = %path.display(), "CSV file parsed");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;

    fn row(pairs: &[(&str, &str)]) -> RawRecord {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn every_field_has_aliases() {
        assert_eq!(FIELD_ALIASES.len(), 16);
        assert!(FIELD_ALIASES.values().all(|a| !a.is_empty()));
    }

    #[test]
    fn canonical_headers_map_to_schema() {
        let r = row(&[
            ("SKU", "A-1"),
            ("SKU Nomi", "Choynak"),
            ("Miqdor", "3"),
            ("Sana", "2024-03-05"),
            ("Yetkazuvchi", "Ali"),
            ("Brend", "Artel"),
            ("Kategoriya", "Oshxona"),
            ("Xarid narxi", "100"),
            ("Komissiya", "10"),
            ("Logistika", "5"),
            ("Sotuv narxi", "200"),
            ("Foyda", "50"),
            ("Markup %", "30"),
            ("Dokon", "Chilonzor"),
            ("Yandex tolov", "180"),
            ("Soliq", "12"),
        ]);
        let rec = normalize_row(&r).unwrap();
        assert_eq!(rec.sku, "A-1");
        assert_eq!(rec.name, "Choynak");
        assert_eq!(rec.quantity, 3.0);
        assert_eq!(rec.date, NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(rec.supplier, "Ali");
        assert_eq!(rec.brand, "Artel");
        assert_eq!(rec.category, "Oshxona");
        assert_eq!(rec.store, "Chilonzor");
        assert_eq!(rec.markup, 30.0);
        assert_eq!(rec.yandex_payment, 180.0);
        assert_eq!(rec.tax, 12.0);
        assert_eq!(rec.total_cost, 115.0);
        assert_eq!(rec.margin, 25.0);
    }

    #[test]
    fn column_letters_and_english_names_resolve() {
        let letters = row(&[("C", "S9"), ("B", "Lamp"), ("R", "400"), ("S", "40")]);
        let rec = normalize_row(&letters).unwrap();
        assert_eq!((rec.sku.as_str(), rec.name.as_str()), ("S9", "Lamp"));
        assert_eq!(rec.margin, 10.0);

        let english = row(&[("sku", "S9"), ("Name", "Lamp"), ("Sale Price", "400")]);
        let rec = normalize_row(&english).unwrap();
        assert_eq!(rec.sale_price, 400.0);
    }

    #[test]
    fn earlier_alias_wins_and_blank_falls_through() {
        let r = row(&[("SKU", "  "), ("C", "from-letter"), ("sku", "from-english"), ("B", "x")]);
        assert_eq!(normalize_row(&r).unwrap().sku, "from-letter");
    }

    #[test]
    fn missing_numbers_default_to_zero() {
        let r = row(&[("SKU", "S1"), ("Name", "P1"), ("Foyda", "n/a"), ("Miqdor", "")]);
        let rec = normalize_row(&r).unwrap();
        for v in [
            rec.quantity,
            rec.purchase_price,
            rec.commission,
            rec.logistics,
            rec.sale_price,
            rec.profit,
            rec.markup,
            rec.yandex_payment,
            rec.tax,
            rec.total_cost,
            rec.margin,
        ] {
            assert_eq!(v, 0.0);
            assert!(!v.is_nan());
        }
        assert_eq!(rec.date, None);
    }

    #[test]
    fn zero_sale_price_gives_zero_margin() {
        let r = row(&[("SKU", "S1"), ("Name", "P1"), ("Sotuv narxi", "0"), ("Foyda", "-20")]);
        let rec = normalize_row(&r).unwrap();
        assert_eq!(rec.margin, 0.0);
        assert_eq!(rec.profit, -20.0);
    }

    #[test]
    fn numeric_cells_are_accepted_as_is() {
        let mut r = RawRecord::new();
        r.insert("SKU", 1042.0);
        r.insert("Name", "Kettle");
        r.insert("Sotuv narxi", 99.5);
        r.insert("Foyda", RawValue::Number(f64::NAN));
        r.insert("Miqdor", RawValue::Other(serde_json::json!([1, 2])));
        let rec = normalize_row(&r).unwrap();
        assert_eq!(rec.sku, "1042");
        assert_eq!(rec.sale_price, 99.5);
        assert_eq!(rec.profit, 0.0);
        assert_eq!(rec.quantity, 0.0);
    }

    #[test]
    fn rows_without_sku_or_name_are_dropped() {
        let rows = vec![
            row(&[("SKU", "S1"), ("Name", "P1")]),
            row(&[("SKU", ""), ("Name", "no sku")]),
            row(&[("SKU", "S3")]),
            row(&[("Name", "P4"), ("Miqdor", "3")]),
            row(&[("SKU", "S5"), ("B", "P5")]),
        ];
        let out = normalize(&rows);
        let skus: Vec<&str> = out.iter().map(|r| r.sku.as_str()).collect();
        assert_eq!(skus, ["S1", "S5"]);
    }

    #[test]
    fn day_first_dates_are_understood() {
        let r = row(&[("SKU", "S1"), ("Name", "P1"), ("Date", "05/03/2024")]);
        assert_eq!(normalize_row(&r).unwrap().date, NaiveDate::from_ymd_opt(2024, 3, 5));
    }

    #[test]
    fn parse_delimited_skips_blank_lines() {
        let text = "SKU , Name,Miqdor\nS1,P1,2\n,,\n\nS2,P2\n";
        let rows = parse_delimited(text.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("SKU"), Some(&RawValue::from("S1")));
        assert_eq!(rows[1].get("Name"), Some(&RawValue::from("P2")));
        assert_eq!(rows[1].get("Miqdor"), None);
    }

    #[test]
    fn load_csv_file_reads_export() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "SKU,SKU Nomi,Sotuv narxi,Foyda").unwrap();
        writeln!(file, "S1,P1,1000,100").unwrap();
        let rows = load_csv_file(file.path()).unwrap();
        let records = normalize(&rows);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].margin, 10.0);
    }

    #[test]
    fn load_csv_file_missing_path_is_error() {
        let err = load_csv_file(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, LoadError::File { .. }));
    }
}
