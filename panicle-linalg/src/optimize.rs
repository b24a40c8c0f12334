//! One-dimensional minimisation.
//!
//! Brent's method (parabolic interpolation with golden-section
//! fallback) on a bracketing interval. Used to refine the REML
//! heritability ratio after a coarse log-scale grid search.

/// Outcome of a bracketed 1-D minimisation.
#[derive(Debug, Clone, Copy)]
pub struct Minimum {
    /// Abscissa of the best point found.
    pub x: f64,
    /// Objective value at `x`.
    pub fx: f64,
    /// Iterations used.
    pub iterations: usize,
    /// Whether the bracket shrank below tolerance within the budget.
    pub converged: bool,
}

const GOLDEN: f64 = 0.381_966_011_250_105_1;

/// Minimise `f` on `[low, high]` with Brent's method.
///
/// When the iteration budget runs out, the best point seen so far is
/// returned with `converged = false`.
pub fn brent_minimize<F>(mut f: F, low: f64, high: f64, tol: f64, max_iter: usize) -> Minimum
where
    F: FnMut(f64) -> f64,
{
    let mut a = low;
    let mut c = high;
    if a > c {
        std::mem::swap(&mut a, &mut c);
    }

    let eps = f64::EPSILON;
    let tol = tol.abs().max(1e-12);

    let mut x = a + GOLDEN * (c - a);
    let mut w = x;
    let mut v = x;

    let mut fx = f(x);
    let mut fw = fx;
    let mut fv = fx;

    let mut d = 0.0_f64;
    let mut e = 0.0_f64;

    for iter in 0..max_iter {
        let m = 0.5 * (a + c);
        let tol1 = tol * x.abs() + eps;
        let tol2 = 2.0 * tol1;

        if (x - m).abs() <= tol2 - 0.5 * (c - a) {
            return Minimum {
                x,
                fx,
                iterations: iter,
                converged: true,
            };
        }

        let mut parabolic = false;
        if e.abs() > tol1 {
            let r = (x - w) * (fx - fv);
            let mut q = (x - v) * (fx - fw);
            let mut p = (x - v) * q - (x - w) * r;
            q = 2.0 * (q - r);
            if q > 0.0 {
                p = -p;
            } else {
                q = -q;
            }
            let e_prev = e;
            if p.abs() < (0.5 * q * e_prev).abs() && p > q * (a - x) && p < q * (c - x) {
                e = d;
                d = p / q;
                let u = x + d;
                if (u - a) < tol2 || (c - u) < tol2 {
                    d = if x < m { tol1 } else { -tol1 };
                }
                parabolic = true;
            }
        }

        if !parabolic {
            e = if x < m { c - x } else { a - x };
            d = GOLDEN * e;
        }

        let u = if d.abs() >= tol1 {
            x + d
        } else if d > 0.0 {
            x + tol1
        } else {
            x - tol1
        };
        let fu = f(u);

        if fu <= fx {
            if u >= x {
                a = x;
            } else {
                c = x;
            }
            v = w;
            fv = fw;
            w = x;
            fw = fx;
            x = u;
            fx = fu;
        } else {
            if u < x {
                a = u;
            } else {
                c = u;
            }
            if fu <= fw || w == x {
                v = w;
                fv = fw;
                w = u;
                fw = fu;
            } else if fu <= fv || v == x || v == w {
                v = u;
                fv = fu;
            }
        }
    }

    Minimum {
        x,
        fx,
        iterations: max_iter,
        converged: false,
    }
}
