use std::collections::{BTreeSet, HashMap};

use polars::prelude::*;
use tracing::warn;

use crate::error::Result;
use crate::model::{ConversionTable, AMOUNT, COUNTRY, IDENTITY_RATE, INR_AMOUNT};

/// Appends `INR_Amount = Amount * rate(Country)`. Countries missing from the
/// table convert at the identity rate and are reported once each.
pub fn normalize(mut frame: DataFrame, rates: &ConversionTable) -> Result<DataFrame> {
    let countries = frame.column(COUNTRY)?.str()?;

    let mut lookup: HashMap<&str, f64> = HashMap::new();
    let mut unknown: BTreeSet<&str> = BTreeSet::new();
    let multipliers: Float64Chunked = countries
        .into_iter()
        .map(|country| {
            let Some(country) = country else {
                return Some(IDENTITY_RATE);
            };
            let rate = *lookup.entry(country).or_insert_with(|| {
                if !rates.contains(country) {
                    unknown.insert(country);
                }
                rates.rate(country)
            });
            Some(rate)
        })
        .collect();

    for country in &unknown {
        warn!(country = %country, rate = IDENTITY_RATE, "no conversion rate, using identity");
    }

    let amount = frame.column(AMOUNT)?.f64()?;
    let inr = (amount * &multipliers).with_name(INR_AMOUNT.into());
    frame.with_column(inr.into_series())?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_known_countries_and_falls_back_to_identity() {
        let frame = DataFrame::new(vec![
            Series::new("Country".into(), &["Japan", "India", "Atlantis"]).into(),
            Series::new("Amount".into(), &[20.0f64, 5.0, 7.0]).into(),
        ])
        .unwrap();
        let rates = ConversionTable::new([("Japan", 0.57), ("India", 1.0)]).unwrap();

        let out = normalize(frame, &rates).unwrap();
        let inr: Vec<Option<f64>> = out.column(INR_AMOUNT).unwrap().f64().unwrap().into_iter().collect();
        assert!((inr[0].unwrap() - 11.4).abs() < 1e-9);
        assert_eq!(inr[1], Some(5.0));
        assert_eq!(inr[2], Some(7.0));
        assert_eq!(out.get_column_names_str().last().copied(), Some(INR_AMOUNT));
    }
}
