use crate::errors::ObliqueTreeError;

/// Create a string of all available items.
pub fn items_to_strings(items: Vec<&str>) -> String {
    let mut s = String::new();
    for i in items {
        s.push_str(i);
        s.push_str(&String::from(", "));
    }
    s
}

pub fn fmt_vec_output(v: &[f64]) -> String {
    let mut res = String::new();
    if let Some(last) = v.len().checked_sub(1) {
        if last == 0 {
            return format!("{:.4}", v[0]);
        }
        for n in &v[..last] {
            res.push_str(format!("{:.4}", n).as_str());
            res.push_str(", ");
        }
        res.push_str(format!("{:.4}", &v[last]).as_str());
    }
    res
}

// Validation
pub fn validate_positive_float_parameter(value: f64, parameter: &str) -> Result<(), ObliqueTreeError> {
    validate_float_parameter(value, 0.0, f64::INFINITY, parameter)
}

pub fn validate_float_parameter(value: f64, min: f64, max: f64, parameter: &str) -> Result<(), ObliqueTreeError> {
    if value.is_nan() || value < min || max < value {
        let ex_msg = format!("real value within range {} and {}", min, max);
        Err(ObliqueTreeError::InvalidParameter(
            parameter.to_string(),
            ex_msg,
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

pub fn validate_min_usize_parameter(value: usize, min: usize, parameter: &str) -> Result<(), ObliqueTreeError> {
    if value < min {
        Err(ObliqueTreeError::InvalidParameter(
            parameter.to_string(),
            format!("integer of at least {}", min),
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Check that a buffer has the length the data implies.
pub fn validate_length(name: &str, expected: usize, provided: usize) -> Result<(), ObliqueTreeError> {
    if expected != provided {
        Err(ObliqueTreeError::ShapeMismatch(name.to_string(), expected, provided))
    } else {
        Ok(())
    }
}

/// Validate sample weights, returning the total weight.
pub fn validate_sample_weight(sample_weight: Option<&[f64]>, rows: usize) -> Result<f64, ObliqueTreeError> {
    match sample_weight {
        None => Ok(rows as f64),
        Some(w) => {
            validate_length("sample_weight", rows, w.len())?;
            let mut total = 0.0;
            for v in w {
                if !v.is_finite() || *v < 0.0 {
                    return Err(ObliqueTreeError::InvalidSampleWeight(*v));
                }
                total += v;
            }
            Ok(total)
        }
    }
}

/// Validate classification labels, returning the number of classes.
///
/// Labels are class indices and every label must be below `max_classes`,
/// which bounds the size of the per class buffers.
pub fn validate_class_labels(y: &[f64], max_classes: usize) -> Result<usize, ObliqueTreeError> {
    let mut n_classes = 0;
    for v in y {
        if !v.is_finite() || *v < 0.0 || v.fract() != 0.0 || *v >= max_classes as f64 {
            return Err(ObliqueTreeError::InvalidTarget(*v));
        }
        n_classes = n_classes.max(*v as usize + 1);
    }
    Ok(n_classes)
}

/// Calculate if a value is missing.
#[inline]
pub fn is_missing(value: f64) -> bool {
    value.is_nan()
}

/// Index of the largest value, the first one wins on ties.
pub fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

/// Scale a row of class counts to sum to one. Rows without mass are left as is.
pub(crate) fn normalize_row(row: &mut [f64]) {
    let total: f64 = row.iter().sum();
    if total > 0.0 {
        row.iter_mut().for_each(|v| *v /= total);
    }
}

#[cfg(test)]
pub(crate) fn precision_round(n: f64, precision: i32) -> f64 {
    let p = (10.0_f64).powi(precision);
    (n * p).round() / p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round() {
        assert_eq!(0.3, precision_round(0.3333, 1));
        assert_eq!(0.2343, precision_round(0.2343123123123, 4));
    }

    #[test]
    fn test_fmt_vec_output() {
        assert_eq!(fmt_vec_output(&[]), "");
        assert_eq!(fmt_vec_output(&[1.0]), "1.0000");
        assert_eq!(fmt_vec_output(&[1.0, -0.5]), "1.0000, -0.5000");
    }

    #[test]
    fn test_validate_float_parameter() {
        assert!(validate_positive_float_parameter(0.0, "x").is_ok());
        assert!(validate_positive_float_parameter(-1.0, "x").is_err());
        assert!(validate_positive_float_parameter(f64::NAN, "x").is_err());
        assert!(validate_float_parameter(0.5, 0.0, 1.0, "x").is_ok());
        assert!(validate_float_parameter(1.5, 0.0, 1.0, "x").is_err());
    }

    #[test]
    fn test_validate_class_labels() {
        assert_eq!(validate_class_labels(&[0., 2., 1.], 3).unwrap(), 3);
        assert!(matches!(
            validate_class_labels(&[0., 1.5], 2),
            Err(ObliqueTreeError::InvalidTarget(_))
        ));
        assert!(validate_class_labels(&[-1.], 1).is_err());
        assert!(validate_class_labels(&[f64::NAN], 1).is_err());
        assert!(matches!(
            validate_class_labels(&[0., 1., 0., 1e18], 4),
            Err(ObliqueTreeError::InvalidTarget(v)) if v == 1e18
        ));
        assert!(validate_class_labels(&[0., 3.], 3).is_err());
    }

    #[test]
    fn test_validate_sample_weight() {
        assert_eq!(validate_sample_weight(None, 4).unwrap(), 4.0);
        assert_eq!(validate_sample_weight(Some(&[1., 2.]), 2).unwrap(), 3.0);
        assert!(validate_sample_weight(Some(&[1.]), 2).is_err());
        assert!(validate_sample_weight(Some(&[1., -2.]), 2).is_err());
        assert!(validate_sample_weight(Some(&[1., f64::INFINITY]), 2).is_err());
    }

    #[test]
    fn test_argmax() {
        assert_eq!(argmax(&[1., 3., 3., 0.]), 1);
        assert_eq!(argmax(&[5.]), 0);
    }
}
