#![allow(dead_code)]

use assert_fs::prelude::*;
use assert_fs::TempDir;

pub const STATS_MODULE: &str = r#"import pandas as pd
import numpy as np


def describe_columns(df: pd.DataFrame, columns=None, percentiles: list = [0.25, 0.5, 0.75]) -> pd.DataFrame:
    """
    Summary statistics for selected columns.

    Identity:
        name: Describe Columns
        category: eda
        prompt: Summarize {{VAR_NAME}}

    Parameters:
    df (pandas.DataFrame): Input data
        role: input
    columns (list): Columns to describe
        widget: column-selector
    percentiles (list): Percentiles to include
    """
    subset = df if columns is None else df[columns]
    return subset.describe(percentiles=percentiles)


def helper(x):
    return x
"#;

pub const SMOOTH_MODULE: &str = r#"import pandas as pd
from typing import Tuple


def rolling_mean(df, window: int = 5, center: bool = False):
    """
    Rolling mean smoothing.

    Identity:
        name: Rolling Mean
        category: data_preprocessing

    Parameters:
    window (int): Window size
        min: 1
        max: 100
    """
    return df.rolling(window, center=center).mean()


def split_half(df: pd.DataFrame) -> Tuple[pd.DataFrame, pd.DataFrame]:
    """
    Split a frame in two.

    Identity:
        name: Split Half
        category: data_operation
    """
    half = len(df) // 2
    return df.iloc[:half], df.iloc[half:]
"#;

pub const DUPLICATE_MODULE: &str = r#"
def rolling_mean(df, window=3):
    """
    A later declaration that loses.

    Identity:
        name: Rolling Mean (plot)
        category: plotting
    """
    return df
"#;

pub const BROKEN_MODULE: &str = "def oops(:\n    pass\n";

/// A library package with two good modules, a duplicate and a broken one
pub fn library() -> TempDir {
    let temp = TempDir::new().unwrap();
    temp.child("algorithm/__init__.py").touch().unwrap();
    temp.child("algorithm/eda/__init__.py").touch().unwrap();
    temp.child("algorithm/eda/stats.py").write_str(STATS_MODULE).unwrap();
    temp.child("algorithm/preprocess/smooth.py").write_str(SMOOTH_MODULE).unwrap();
    temp.child("algorithm/zz_dupes.py").write_str(DUPLICATE_MODULE).unwrap();
    temp.child("algorithm/broken.py").write_str(BROKEN_MODULE).unwrap();
    temp.child("algorithm/__pycache__/stats.py").write_str(DUPLICATE_MODULE).unwrap();
    temp
}
